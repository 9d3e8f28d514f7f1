//! Startup orchestration.
//!
//! # Responsibilities
//! - Start serving in the background
//! - Confirm the RPC server answers before reporting success
//! - Log every listening endpoint
//!
//! # Design Decisions
//! - Fail fast: a failed health ping is returned to the caller
//! - The service keeps running after a failed ping; the caller decides whether to stop it

use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::health::{CheckRequest, CheckResponse, CHECK_METHOD};
use crate::net::dial_endpoint;
use crate::rpc::client::RpcClient;
use crate::rpc::status::Status;
use crate::service::{ServiceError, WebService};

/// Why the service did not come up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to check internal service health: {0}")]
    HealthCheck(#[from] Status),

    #[error("internal service health check timed out after {0:?}")]
    Timeout(Duration),
}

/// Spawn `service.run()` and ping the RPC health check.
///
/// Returns the handle of the running task; it resolves when the service stops.
pub async fn start(
    service: &WebService,
    ping_timeout: Duration,
) -> Result<JoinHandle<Result<(), ServiceError>>, StartupError> {
    let running = {
        let service = service.clone();
        tokio::spawn(async move { service.run().await })
    };

    let client = RpcClient::new(dial_endpoint(service.rpc_address()));
    let req = CheckRequest::default();
    let ping = client.call::<_, CheckResponse>(CHECK_METHOD, &req);
    match tokio::time::timeout(ping_timeout, ping).await {
        Ok(Ok(_)) => {}
        Ok(Err(status)) => return Err(status.into()),
        Err(_) => return Err(StartupError::Timeout(ping_timeout)),
    }

    for info in service.ports() {
        tracing::info!(kind = %info.kind, address = %info.address, "Service is accepting calls");
    }
    Ok(running)
}
