//! RPC framework subsystem.
//!
//! # Data Flow
//! ```text
//! POST /{package.Service}/{Method}
//!     → server.rs (decode JSON body, dispatch to the registered method)
//!     → interceptor.rs (outermost interceptor first, handler last)
//!     → recovery.rs (panics below it become a Status)
//!     → status.rs (errors mapped to HTTP status + JSON body)
//!
//! client.rs dials the same wire format (gateway, health ping).
//! ```
//!
//! # Design Decisions
//! - Messages are `serde_json::Value` inside the chain, typed at the edges
//! - Server streaming is newline-delimited JSON, one frame per message

pub mod client;
pub mod interceptor;
pub mod recovery;
pub mod server;
pub mod status;

pub use client::RpcClient;
pub use interceptor::{
    RpcContext, StreamHandler, StreamInterceptor, UnaryHandler, UnaryInterceptor, ValueStream,
};
pub use recovery::{default_panic_handler, stream_recovery, unary_recovery, PanicHandler, PanicPayload};
pub use server::{RpcServer, ServerOption, StreamFrame};
pub use status::{Code, Status};
