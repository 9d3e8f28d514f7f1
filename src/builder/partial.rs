//! Service builder wired from [`ServerSettings`].
//!
//! Uses defaults that suit most services: RPC on the configured address, the
//! gateway on the external REST port, health and internal handlers on the
//! internal REST port. Services needing a different layout should build one
//! from scratch with [`ServiceBuilder`].

use axum::routing::MethodRouter;
use std::sync::Arc;
use std::time::Duration;

use super::rpc::{RpcRegistration, ServiceBuilder};
use crate::config::ServerSettings;
use crate::gateway::{GatewayOption, GatewayRegistration};
use crate::health::{self, HEALTH_PATH};
use crate::observability::logging::LogSink;
use crate::rpc::interceptor::UnaryInterceptor;
use crate::rpc::server::ServerOption;

/// What the application contributes on top of the settings.
#[derive(Clone, Default)]
pub struct ServiceParts {
    pub rpc_apis: Vec<RpcRegistration>,
    pub unary_interceptors: Vec<UnaryInterceptor>,
    pub gateway_handlers: Vec<GatewayRegistration>,
    pub gateway_options: Vec<GatewayOption>,
    /// Served on the internal REST port.
    pub internal_handlers: Vec<(String, MethodRouter)>,
    pub log: Option<LogSink>,
}

pub fn service_builder(settings: &ServerSettings, parts: ServiceParts) -> ServiceBuilder {
    let mut builder = ServiceBuilder::new();
    if let Some(log) = parts.log.clone() {
        builder = builder.set_logger(log);
    }
    if let Some(address) = &settings.rpc.address {
        builder = builder.listen_on(address.clone());
    }

    let mut options: Vec<ServerOption> = parts
        .unary_interceptors
        .iter()
        .cloned()
        .map(ServerOption::UnaryInterceptor)
        .collect();
    if let Some(timeout) = settings.rpc.request_timeout() {
        options.push(ServerOption::RequestTimeout(timeout));
    }
    if let Some(limit) = settings.rpc.max_request_bytes {
        options.push(ServerOption::MaxRequestBytes(limit));
    }
    if !options.is_empty() {
        builder = builder.add_server_options(options);
    }

    let builder = external_api(builder, settings, &parts);
    internal_api(builder, settings, &parts)
}

fn external_api(builder: ServiceBuilder, settings: &ServerSettings, parts: &ServiceParts) -> ServiceBuilder {
    let builder = if parts.rpc_apis.is_empty() {
        builder
    } else {
        builder.register_rpc_apis(parts.rpc_apis.iter().cloned())
    };
    match settings.rest.external_port {
        Some(port) if !parts.gateway_handlers.is_empty() => builder
            .add_rest_server()
            .listen_on(format!(":{port}"))
            .add_gateway_options(parts.gateway_options.iter().cloned())
            .register_gateway_handlers(parts.gateway_handlers.iter().cloned())
            .build_rest_part(),
        _ => builder,
    }
}

fn internal_api(builder: ServiceBuilder, settings: &ServerSettings, parts: &ServiceParts) -> ServiceBuilder {
    let Some(port) = settings.rest.internal_port else {
        return builder;
    };
    let timeout = Duration::from_secs(settings.rest.health_timeout_secs);

    let mut rest = builder
        .register_rpc_api(health::register_service)
        .add_rest_server()
        .listen_on(format!(":{port}"));
    for (pattern, route) in &parts.internal_handlers {
        rest = rest.add_route(pattern.clone(), route.clone());
    }
    if !parts.internal_handlers.iter().any(|(pattern, _)| pattern == HEALTH_PATH) {
        rest = rest.add_endpoint_handler(HEALTH_PATH, move |endpoint| {
            health::http_handler(endpoint, Some(timeout))
        });
    }
    rest.register_gateway_handlers([Arc::new(health::register_gateway) as GatewayRegistration])
        .build_rest_part()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::server::RpcServer;
    use crate::rpc::status::Status;
    use axum::routing::get;

    fn echo_api() -> RpcRegistration {
        Arc::new(|server: &mut RpcServer| {
            server.add_unary("demo.Echo", "Echo", |_ctx, req: serde_json::Value| async move {
                Ok::<_, Status>(req)
            });
        })
    }

    #[tokio::test]
    async fn internal_port_only() {
        let mut settings = ServerSettings::default();
        settings.rpc.address = Some("127.0.0.1:0".into());
        settings.rest.internal_port = Some(0);

        let parts = ServiceParts {
            rpc_apis: vec![echo_api()],
            internal_handlers: vec![("/self".into(), get(|| async { "me" }))],
            ..Default::default()
        };
        let service = service_builder(&settings, parts).build().unwrap();

        let ports = service.ports();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].kind, crate::service::ServerKind::Rpc);
        assert_eq!(ports[1].kind, crate::service::ServerKind::Rest);
        service.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn no_rest_without_ports() {
        let mut settings = ServerSettings::default();
        settings.rpc.address = Some("127.0.0.1:0".into());
        let parts = ServiceParts {
            rpc_apis: vec![echo_api()],
            gateway_handlers: vec![crate::gateway::registration(|_mux, _endpoint| Ok(()))],
            ..Default::default()
        };

        let service = service_builder(&settings, parts).build().unwrap();
        assert_eq!(service.ports().len(), 1);
        service.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[test]
    fn without_apis_build_fails() {
        let settings = ServerSettings::default();
        let err = service_builder(&settings, ServiceParts::default())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, crate::service::BuildError::NoServicesRegistered));
    }
}
