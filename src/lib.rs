//! Multi-listener web service runtime.
//!
//! One RPC server plus any number of companion HTTP listeners, optionally
//! fronted by a gateway translating HTTP requests into RPC calls. Everything
//! is bound at build time, served concurrently by `run`, and drained with a
//! deadline by `stop`.

pub mod builder;
pub mod config;
pub mod gateway;
pub mod health;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod rpc;
pub mod service;

pub use builder::{RestBuilder, RestServer, ServiceBuilder};
pub use config::ServerSettings;
pub use gateway::{GatewayError, GatewayMux, GatewayOption};
pub use rpc::{RpcClient, RpcServer, ServerOption, Status};
pub use service::{BuildError, ListenInfo, ServerKind, ServiceError, WebService};
