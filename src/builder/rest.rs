//! REST sub-builder: one HTTP listener, its handlers and its gateway.

use axum::{
    extract::Request,
    handler::Handler,
    response::IntoResponse,
    routing::{any, any_service, MethodRouter},
    Router,
};
use std::convert::Infallible;
use std::net::TcpListener;
use std::sync::Arc;
use tower::Service;

use super::rpc::ServiceBuilder;
use super::Mutators;
use crate::gateway::{GatewayError, GatewayMux, GatewayOption, GatewayRegistration};

/// Builds a handler once the RPC dial endpoint is known.
pub type EndpointHandler = Arc<dyn Fn(&str) -> MethodRouter + Send + Sync>;

/// Caller-supplied HTTP server: a router plus an optional listen address.
///
/// Declared handlers and the gateway are added on top of `router`.
#[derive(Clone, Default)]
pub struct RestServer {
    pub(crate) address: Option<String>,
    pub(crate) router: Router,
}

impl RestServer {
    pub fn new(router: Router) -> Self {
        Self {
            address: None,
            router,
        }
    }

    /// Address used when no custom listener is supplied.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

/// One REST listener's configuration.
#[derive(Clone, Default)]
pub struct RestConfig {
    pub(crate) address: Option<String>,
    pub(crate) listener: Option<Arc<TcpListener>>,
    pub(crate) server: Option<RestServer>,
    pub(crate) handlers: Vec<(String, MethodRouter)>,
    pub(crate) handler_fns: Vec<(String, MethodRouter)>,
    pub(crate) endpoint_handlers: Vec<(String, EndpointHandler)>,
    pub(crate) gateway_mux: Option<GatewayMux>,
    pub(crate) gateway_registrations: Vec<GatewayRegistration>,
    pub(crate) gateway_options: Vec<GatewayOption>,
}

impl RestConfig {
    /// Every declared pattern, in declaration order, duplicates included.
    pub(crate) fn patterns(&self) -> impl Iterator<Item = &str> {
        self.handlers
            .iter()
            .chain(&self.handler_fns)
            .map(|(pattern, _)| pattern.as_str())
            .chain(self.endpoint_handlers.iter().map(|(pattern, _)| pattern.as_str()))
    }
}

/// Builder for one REST listener, chained off a [`ServiceBuilder`].
pub struct RestBuilder {
    parent: ServiceBuilder,
    mutators: Mutators<RestConfig>,
}

impl RestBuilder {
    pub(crate) fn new(parent: ServiceBuilder) -> Self {
        Self {
            parent,
            mutators: Mutators::new(),
        }
    }

    pub fn listen_on(mut self, address: impl Into<String>) -> Self {
        let address = address.into();
        self.mutators.push(move |cfg| cfg.address = Some(address.clone()));
        self
    }

    /// Serve on an already bound listener; overrides every address.
    pub fn set_custom_listener(self, listener: TcpListener) -> Self {
        self.set_shared_listener(Arc::new(listener))
    }

    /// Like [`set_custom_listener`](Self::set_custom_listener), for a listener
    /// that other REST parts (or the RPC part) also serve on.
    pub fn set_shared_listener(mut self, listener: Arc<TcpListener>) -> Self {
        self.mutators.push(move |cfg| cfg.listener = Some(listener.clone()));
        self
    }

    pub fn set_custom_server(mut self, server: RestServer) -> Self {
        self.mutators.push(move |cfg| cfg.server = Some(server.clone()));
        self
    }

    /// Serve `service` at the literal `pattern`, for every HTTP method.
    pub fn add_handler<S>(mut self, pattern: impl Into<String>, service: S) -> Self
    where
        S: Service<Request, Error = Infallible> + Clone + Send + Sync + 'static,
        S::Response: IntoResponse + 'static,
        S::Future: Send + 'static,
    {
        let pattern = pattern.into();
        let route: MethodRouter = any_service(service);
        self.mutators
            .push(move |cfg| cfg.handlers.push((pattern.clone(), route.clone())));
        self
    }

    /// Serve the axum handler `handler` at `pattern`, for every HTTP method.
    pub fn add_handler_fn<H, T>(self, pattern: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.add_route(pattern, any(handler))
    }

    /// Serve a method router (e.g. `get(..)`) at `pattern`.
    pub fn add_route(mut self, pattern: impl Into<String>, route: MethodRouter) -> Self {
        let pattern = pattern.into();
        self.mutators
            .push(move |cfg| cfg.handler_fns.push((pattern.clone(), route.clone())));
        self
    }

    /// Serve a handler built from the RPC dial endpoint at `pattern`.
    pub fn add_endpoint_handler<F>(mut self, pattern: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&str) -> MethodRouter + Send + Sync + 'static,
    {
        let pattern = pattern.into();
        let factory: EndpointHandler = Arc::new(factory);
        self.mutators
            .push(move |cfg| cfg.endpoint_handlers.push((pattern.clone(), factory.clone())));
        self
    }

    /// Use this mux instead of a fresh one; gateway options are applied to it.
    pub fn set_custom_gateway_mux(mut self, mux: GatewayMux) -> Self {
        self.mutators.push(move |cfg| cfg.gateway_mux = Some(mux.clone()));
        self
    }

    pub fn register_gateway_handlers<I>(mut self, registrations: I) -> Self
    where
        I: IntoIterator<Item = GatewayRegistration>,
    {
        let registrations: Vec<_> = registrations.into_iter().collect();
        self.mutators.push(move |cfg| {
            cfg.gateway_registrations
                .extend(registrations.iter().cloned())
        });
        self
    }

    /// Single-callback form of [`register_gateway_handlers`](Self::register_gateway_handlers).
    pub fn register_gateway_handler<F>(self, registration: F) -> Self
    where
        F: Fn(&mut GatewayMux, &str) -> Result<(), GatewayError> + Send + Sync + 'static,
    {
        self.register_gateway_handlers([Arc::new(registration) as GatewayRegistration])
    }

    pub fn add_gateway_options<I>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = GatewayOption>,
    {
        let options: Vec<_> = options.into_iter().collect();
        self.mutators
            .push(move |cfg| cfg.gateway_options.extend(options.iter().cloned()));
        self
    }

    /// Hand this listener's configuration to the parent builder.
    pub fn build_rest_part(self) -> ServiceBuilder {
        self.parent.push_rest(self.mutators)
    }
}
