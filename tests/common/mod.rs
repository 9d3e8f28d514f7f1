//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use axum::http::Method;
use futures_util::stream;
use serde::{Deserialize, Serialize};
use std::net::TcpListener;
use std::time::Duration;

use multiserve::gateway::{GatewayError, GatewayMux};
use multiserve::rpc::{RpcContext, RpcServer, Status};

pub const ECHO_SERVICE: &str = "test.Echo";
pub const ECHO_METHOD: &str = "/test.Echo/Echo";
pub const COUNT_METHOD: &str = "/test.Echo/Count";
pub const SLOW_METHOD: &str = "/test.Echo/Slow";
pub const PANIC_METHOD: &str = "/test.Echo/Panic";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EchoMessage {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl EchoMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            request_id: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CountRequest {
    #[serde(default)]
    message: String,
    times: String,
}

#[derive(Debug, Deserialize)]
struct SlowRequest {
    millis: u64,
}

/// Echo, Count (server streaming), Slow and Panic on `test.Echo`.
pub fn register_echo(server: &mut RpcServer) {
    server
        .add_unary(ECHO_SERVICE, "Echo", |ctx: RpcContext, mut req: EchoMessage| async move {
            req.request_id = ctx.request_id().map(str::to_string);
            Ok::<_, Status>(req)
        })
        .add_unary(ECHO_SERVICE, "Slow", |_ctx: RpcContext, req: SlowRequest| async move {
            tokio::time::sleep(Duration::from_millis(req.millis)).await;
            Ok::<_, Status>(EchoMessage::new("done"))
        })
        .add_unary(ECHO_SERVICE, "Panic", |_ctx: RpcContext, _req: EchoMessage| async move {
            if true {
                panic!("handler exploded");
            }
            Ok::<_, Status>(EchoMessage::default())
        })
        .add_server_streaming(ECHO_SERVICE, "Count", |_ctx: RpcContext, req: CountRequest| async move {
            let times: usize = req
                .times
                .parse()
                .map_err(|_| Status::invalid_argument("times must be a number"))?;
            let message = req.message;
            Ok::<_, Status>(stream::iter((1..=times).map(move |i| {
                Ok::<_, Status>(EchoMessage::new(format!("{message} {i}")))
            })))
        });
}

/// Gateway routes onto `test.Echo`.
pub fn register_echo_gateway(mux: &mut GatewayMux, endpoint: &str) -> Result<(), GatewayError> {
    mux.handle(Method::POST, "/v1/echo", endpoint, ECHO_METHOD)?
        .handle(Method::GET, "/v1/echo/{message}", endpoint, ECHO_METHOD)?
        .handle_server_stream(Method::GET, "/v1/count/{times}", endpoint, COUNT_METHOD)?;
    Ok(())
}

/// A port nothing listens on right now.
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("free port")
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .no_proxy()
        .build()
        .expect("http client")
}
