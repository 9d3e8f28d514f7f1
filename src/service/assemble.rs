//! Turning a [`ServiceConfig`] into a [`WebService`].
//!
//! Listeners are bound in declaration order, RPC first. Configs whose
//! listeners resolve to the same bound address are merged into one binding.
//! On any failure every listener opened so far is closed before returning.

use axum::{routing::MethodRouter, Router};
use std::any::Any;
use std::collections::HashSet;
use std::mem;
use std::net::{SocketAddr, TcpListener};
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::binding::ListenerBinding;
use super::errors::BuildError;
use super::web::WebService;
use super::{ListenInfo, ServerKind};
use crate::builder::{RestConfig, ServiceConfig};
use crate::gateway::GatewayMux;
use crate::health;
use crate::net::listener::{create_listener, dial_endpoint, duplicate, extract_port, ListenerError};
use crate::observability::logging::{noop_sink, LogSink};
use crate::rpc::recovery::{default_handler, stream_recovery, unary_recovery};
use crate::rpc::server::{unimplemented, RpcServer, ServerOption};

/// A bound listener whose router is still being put together.
struct PendingBinding {
    address: SocketAddr,
    listener: TcpListener,
    routes: Router,
    fallback: Option<Router>,
    has_rpc: bool,
}

impl PendingBinding {
    fn merge(&mut self, routes: Router, fallback: Option<Router>) -> Result<(), BuildError> {
        if fallback.is_some() && self.fallback.is_some() {
            return Err(BuildError::ListenerConflict {
                address: self.address,
                reason: "more than one gateway on the same listener".into(),
            });
        }
        let current = mem::take(&mut self.routes);
        self.routes = catch_unwind(AssertUnwindSafe(move || current.merge(routes))).map_err(|payload| {
            BuildError::ListenerConflict {
                address: self.address,
                reason: panic_message(payload),
            }
        })?;
        if fallback.is_some() {
            self.fallback = fallback;
        }
        Ok(())
    }

    fn finish(self) -> ListenerBinding {
        let kind = if self.has_rpc { ServerKind::Rpc } else { ServerKind::Rest };
        let app = match self.fallback {
            Some(fallback) => self.routes.fallback_service(fallback),
            None if self.has_rpc => self.routes.fallback(unimplemented),
            None => self.routes,
        };
        ListenerBinding::new(kind, self.address, self.listener, app)
    }
}

pub(crate) fn assemble(config: ServiceConfig) -> Result<WebService, BuildError> {
    let log = config.log.clone().unwrap_or_else(noop_sink);
    let mut pending = Vec::new();

    match build_bindings(config, &log, &mut pending) {
        Ok((ports, rpc_address)) => {
            let bindings = pending.into_iter().map(PendingBinding::finish).collect();
            Ok(WebService::new(bindings, ports, rpc_address, log))
        }
        Err(e) => {
            for binding in pending {
                log(format_args!("closing listener {} after failed build", binding.address));
                tracing::debug!(address = %binding.address, error = %e, "Closing listener after failed build");
            }
            Err(e)
        }
    }
}

fn build_bindings(
    config: ServiceConfig,
    log: &LogSink,
    pending: &mut Vec<PendingBinding>,
) -> Result<(Vec<ListenInfo>, SocketAddr), BuildError> {
    let ServiceConfig { rpc, rest, .. } = config;
    if rpc.registrations.is_empty() {
        return Err(BuildError::NoServicesRegistered);
    }

    // RPC listener and server.
    let listener = open_listener(rpc.listener.as_deref(), rpc.address.as_deref())?;
    let rpc_address = bound_address(&listener)?;
    let slot = attach(pending, rpc_address, listener);

    let mut server = match rpc.server {
        Some(server) => server,
        None => {
            let handler = rpc.panic_handler.unwrap_or_else(default_handler);
            let recovery = [
                ServerOption::UnaryInterceptor(unary_recovery(handler.clone())),
                ServerOption::StreamInterceptor(stream_recovery(handler)),
            ];
            RpcServer::with_options(recovery.into_iter().chain(rpc.options))
        }
    };
    for registration in &rpc.registrations {
        registration(&mut server);
    }
    log(format_args!("Registering internal health service"));
    health::register_service(&mut server);
    if let Some(method) = server.take_duplicates().into_iter().next() {
        return Err(BuildError::DuplicateMethod { method });
    }
    pending[slot].merge(server.into_router(), None)?;
    pending[slot].has_rpc = true;

    let endpoint = dial_endpoint(rpc_address);
    let mut ports = vec![ListenInfo {
        address: rpc_address.to_string(),
        port: extract_port(&rpc_address),
        kind: ServerKind::Rpc,
    }];

    // REST listeners, in declaration order.
    for cfg in rest {
        let configured = cfg
            .server
            .as_ref()
            .and_then(|server| server.address.as_deref())
            .or(cfg.address.as_deref());
        let listener = open_listener(cfg.listener.as_deref(), configured)?;
        let address = bound_address(&listener)?;
        let slot = attach(pending, address, listener);

        let (routes, fallback) = rest_router(&cfg, address, &endpoint, log)?;
        pending[slot].merge(routes, fallback)?;

        if extract_port(&address) != extract_port(&rpc_address) {
            ports.push(ListenInfo {
                address: address.to_string(),
                port: extract_port(&address),
                kind: ServerKind::Rest,
            });
        }
    }

    Ok((ports, rpc_address))
}

fn open_listener(custom: Option<&TcpListener>, address: Option<&str>) -> Result<TcpListener, BuildError> {
    match custom {
        Some(listener) => duplicate(listener).map_err(|source| {
            BuildError::Listener(ListenerError::Bind {
                address: listener
                    .local_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|_| "custom listener".into()),
                source,
            })
        }),
        None => Ok(create_listener(address.unwrap_or_default())?),
    }
}

fn bound_address(listener: &TcpListener) -> Result<SocketAddr, BuildError> {
    listener.local_addr().map_err(|source| {
        BuildError::Listener(ListenerError::Bind {
            address: "unknown".into(),
            source,
        })
    })
}

/// Index of the binding for `address`, creating it when new.
fn attach(pending: &mut Vec<PendingBinding>, address: SocketAddr, listener: TcpListener) -> usize {
    if let Some(index) = pending.iter().position(|b| b.address == address) {
        // Same socket, second handle.
        drop(listener);
        return index;
    }
    pending.push(PendingBinding {
        address,
        listener,
        routes: Router::new(),
        fallback: None,
        has_rpc: false,
    });
    pending.len() - 1
}

fn rest_router(
    cfg: &RestConfig,
    address: SocketAddr,
    endpoint: &str,
    log: &LogSink,
) -> Result<(Router, Option<Router>), BuildError> {
    let mut seen = HashSet::new();
    for pattern in cfg.patterns() {
        if !seen.insert(pattern) {
            return Err(BuildError::PatternConflict {
                address,
                pattern: pattern.to_string(),
            });
        }
    }

    let mut router = cfg
        .server
        .as_ref()
        .map(|server| server.router.clone())
        .unwrap_or_default();
    for (pattern, route) in cfg.handlers.iter().chain(&cfg.handler_fns) {
        router = add_route(router, pattern, route.clone())?;
    }
    for (pattern, factory) in &cfg.endpoint_handlers {
        router = add_route(router, pattern, factory(endpoint))?;
    }

    let fallback = if cfg.gateway_registrations.is_empty() {
        None
    } else {
        if seen.contains("/") {
            return Err(BuildError::RootPatternTaken { address });
        }
        let mut mux = match &cfg.gateway_mux {
            Some(mux) => {
                let mut mux = mux.clone();
                mux.apply_options(cfg.gateway_options.iter().cloned());
                mux
            }
            None => GatewayMux::new(cfg.gateway_options.iter().cloned()),
        };
        for registration in &cfg.gateway_registrations {
            registration(&mut mux, endpoint)?;
        }
        health::register_gateway(&mut mux, endpoint)?;
        log(format_args!("gateway on {} dials RPC endpoint {}", address, endpoint));
        Some(mux.into_router())
    };

    if seen.is_empty() && fallback.is_none() {
        return Err(BuildError::NothingToHandle { address });
    }
    Ok((router, fallback))
}

fn add_route(router: Router, pattern: &str, route: MethodRouter) -> Result<Router, BuildError> {
    let invalid = |reason: String| BuildError::InvalidPattern {
        pattern: pattern.to_string(),
        reason,
    };
    if !pattern.starts_with('/') {
        return Err(invalid("pattern must start with '/'".into()));
    }
    if pattern
        .split('/')
        .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
    {
        return Err(invalid("use {name} or {*name} for captures".into()));
    }
    catch_unwind(AssertUnwindSafe(move || router.route(pattern, route)))
        .map_err(|payload| invalid(panic_message(payload)))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "route registration failed".to_string(),
        },
    }
}
