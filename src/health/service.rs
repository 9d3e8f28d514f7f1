//! Health RPC service and its gateway route.

use axum::http::Method;
use serde::{Deserialize, Serialize};

use super::{CHECK_METHOD, HEALTH_PATH, HEALTH_SERVICE};
use crate::gateway::{GatewayError, GatewayMux};
use crate::rpc::interceptor::RpcContext;
use crate::rpc::server::RpcServer;
use crate::rpc::status::Status;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckRequest {
    #[serde(default)]
    pub service: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServingStatus {
    Unknown,
    Serving,
    NotServing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub status: ServingStatus,
}

async fn check(_ctx: RpcContext, _req: CheckRequest) -> Result<CheckResponse, Status> {
    Ok(CheckResponse {
        status: ServingStatus::Serving,
    })
}

/// Attach the health service unless one is already registered.
pub fn register_service(server: &mut RpcServer) {
    if server.has_service(HEALTH_SERVICE) {
        tracing::debug!(service = HEALTH_SERVICE, "Health service already registered");
        return;
    }
    server.add_unary(HEALTH_SERVICE, "Check", check);
}

/// Mount `GET /health` on `mux` unless the route already exists.
pub fn register_gateway(mux: &mut GatewayMux, endpoint: &str) -> Result<(), GatewayError> {
    if mux.has_route(&Method::GET, HEALTH_PATH) {
        return Ok(());
    }
    mux.handle(Method::GET, HEALTH_PATH, endpoint, CHECK_METHOD)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_service_is_idempotent() {
        let mut server = RpcServer::new();
        register_service(&mut server);
        register_service(&mut server);

        assert!(server.has_service(HEALTH_SERVICE));
        assert!(server.take_duplicates().is_empty());
        assert_eq!(server.methods().collect::<Vec<_>>(), vec![CHECK_METHOD]);
    }

    #[test]
    fn register_gateway_skips_existing_route() {
        let mut mux = GatewayMux::default();
        register_gateway(&mut mux, "127.0.0.1:1").unwrap();
        register_gateway(&mut mux, "127.0.0.1:1").unwrap();
        assert_eq!(mux.routes().count(), 1);
    }

    #[test]
    fn serving_status_wire_name() {
        let json = serde_json::to_value(CheckResponse { status: ServingStatus::Serving }).unwrap();
        assert_eq!(json["status"], "SERVING");
    }
}
