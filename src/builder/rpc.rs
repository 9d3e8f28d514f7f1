//! Root builder: RPC listener and server.

use std::net::TcpListener;
use std::sync::Arc;

use super::rest::{RestBuilder, RestConfig};
use super::Mutators;
use crate::observability::logging::LogSink;
use crate::rpc::recovery::PanicHandler;
use crate::rpc::server::{RpcServer, ServerOption};
use crate::service::{assemble, BuildError, WebService};

/// Attaches services to the RPC server.
pub type RpcRegistration = Arc<dyn Fn(&mut RpcServer) + Send + Sync>;

/// RPC part of a service configuration.
#[derive(Clone, Default)]
pub struct RpcConfig {
    pub(crate) address: Option<String>,
    pub(crate) listener: Option<Arc<TcpListener>>,
    pub(crate) server: Option<RpcServer>,
    pub(crate) registrations: Vec<RpcRegistration>,
    pub(crate) options: Vec<ServerOption>,
    pub(crate) panic_handler: Option<PanicHandler>,
}

/// Everything `build` needs.
#[derive(Clone, Default)]
pub struct ServiceConfig {
    pub(crate) rpc: RpcConfig,
    pub(crate) rest: Vec<RestConfig>,
    pub(crate) log: Option<LogSink>,
}

/// Builder of a [`WebService`].
#[derive(Clone, Default)]
pub struct ServiceBuilder {
    mutators: Mutators<ServiceConfig>,
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// RPC listen address. `":port"` listens on every interface.
    pub fn listen_on(mut self, address: impl Into<String>) -> Self {
        let address = address.into();
        self.mutators
            .push(move |cfg| cfg.rpc.address = Some(address.clone()));
        self
    }

    /// Serve RPC on an already bound listener; overrides `listen_on`.
    pub fn set_custom_listener(self, listener: TcpListener) -> Self {
        self.set_shared_listener(Arc::new(listener))
    }

    /// Like [`set_custom_listener`](Self::set_custom_listener), for a listener
    /// REST parts also serve on. Their routes are merged into the RPC router.
    pub fn set_shared_listener(mut self, listener: Arc<TcpListener>) -> Self {
        self.mutators
            .push(move |cfg| cfg.rpc.listener = Some(listener.clone()));
        self
    }

    /// Use this server as-is instead of a default one; server options and the
    /// panic handler are not applied to it.
    pub fn set_custom_rpc_server(mut self, server: RpcServer) -> Self {
        self.mutators
            .push(move |cfg| cfg.rpc.server = Some(server.clone()));
        self
    }

    pub fn register_rpc_apis<I>(mut self, registrations: I) -> Self
    where
        I: IntoIterator<Item = RpcRegistration>,
    {
        let registrations: Vec<_> = registrations.into_iter().collect();
        self.mutators
            .push(move |cfg| cfg.rpc.registrations.extend(registrations.iter().cloned()));
        self
    }

    /// Single-callback form of [`register_rpc_apis`](Self::register_rpc_apis).
    pub fn register_rpc_api<F>(self, registration: F) -> Self
    where
        F: Fn(&mut RpcServer) + Send + Sync + 'static,
    {
        self.register_rpc_apis([Arc::new(registration) as RpcRegistration])
    }

    pub fn add_server_options<I>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = ServerOption>,
    {
        let options: Vec<_> = options.into_iter().collect();
        self.mutators
            .push(move |cfg| cfg.rpc.options.extend(options.iter().cloned()));
        self
    }

    /// Replace the default panic-to-status mapping.
    pub fn set_panic_handler(mut self, handler: PanicHandler) -> Self {
        self.mutators
            .push(move |cfg| cfg.rpc.panic_handler = Some(handler.clone()));
        self
    }

    /// Sink for the service's own lifecycle lines.
    pub fn set_logger(mut self, log: LogSink) -> Self {
        self.mutators.push(move |cfg| cfg.log = Some(log.clone()));
        self
    }

    /// Start describing one more REST listener.
    pub fn add_rest_server(self) -> RestBuilder {
        RestBuilder::new(self)
    }

    pub(crate) fn push_rest(mut self, part: Mutators<RestConfig>) -> Self {
        self.mutators.push(move |cfg| cfg.rest.push(part.apply()));
        self
    }

    /// Bind every listener and assemble the service.
    pub fn build(&self) -> Result<WebService, BuildError> {
        assemble(self.mutators.apply())
    }
}
