//! Plain HTTP health handler backed by the RPC health check.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, MethodRouter},
};
use std::time::Duration;

use super::{CheckRequest, CheckResponse, CHECK_METHOD};
use crate::rpc::client::RpcClient;

/// `GET` handler that calls the health check at `endpoint`.
///
/// Answers `200 healthy` on success and `500` with the error text otherwise.
pub fn http_handler(endpoint: &str, timeout: Option<Duration>) -> MethodRouter {
    let client = RpcClient::new(endpoint);
    get(move || {
        let client = client.clone();
        async move { check(client, timeout).await }
    })
}

async fn check(client: RpcClient, timeout: Option<Duration>) -> Response {
    let req = CheckRequest::default();
    let call = client.call::<_, CheckResponse>(CHECK_METHOD, &req);
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result.map_err(|status| status.to_string()),
            Err(_) => Err(format!("health check exceeded {}ms", limit.as_millis())),
        },
        None => call.await.map_err(|status| status.to_string()),
    };
    match result {
        Ok(_) => (StatusCode::OK, "healthy\n").into_response(),
        Err(error) => {
            tracing::warn!(endpoint = %client.endpoint(), error = %error, "Health check failed");
            (StatusCode::INTERNAL_SERVER_ERROR, error).into_response()
        }
    }
}
