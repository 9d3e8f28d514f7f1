//! Service builders.
//!
//! # Data Flow
//! ```text
//! ServiceBuilder::listen_on / register_rpc_apis / ...   (push closures)
//!     → add_rest_server() → RestBuilder (own closures) → build_rest_part()
//!     → build(): apply closures on a fresh ServiceConfig
//!     → service::assemble (listeners, routers, WebService)
//! ```
//!
//! # Design Decisions
//! - Builder calls only record intent; nothing is validated until build()
//! - Closures are kept, so one builder can build several services
//! - Scalars: last write wins. Collections: appended in call order

pub mod partial;
pub mod rest;
pub mod rpc;

use std::sync::Arc;

pub use rest::{EndpointHandler, RestBuilder, RestConfig, RestServer};
pub use rpc::{RpcConfig, RpcRegistration, ServiceBuilder, ServiceConfig};

type Mutator<C> = Arc<dyn Fn(&mut C) + Send + Sync>;

/// Ordered list of configuration mutations.
pub struct Mutators<C> {
    list: Vec<Mutator<C>>,
}

impl<C> Mutators<C> {
    pub fn new() -> Self {
        Self { list: Vec::new() }
    }

    pub fn push<F>(&mut self, f: F)
    where
        F: Fn(&mut C) + Send + Sync + 'static,
    {
        self.list.push(Arc::new(f));
    }
}

impl<C: Default> Mutators<C> {
    /// Run every mutation, in order, on a fresh default config.
    pub fn apply(&self) -> C {
        let mut config = C::default();
        for mutate in &self.list {
            mutate(&mut config);
        }
        config
    }
}

impl<C> Clone for Mutators<C> {
    fn clone(&self) -> Self {
        Self {
            list: self.list.clone(),
        }
    }
}

impl<C> Default for Mutators<C> {
    fn default() -> Self {
        Self::new()
    }
}
