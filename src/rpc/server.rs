//! RPC server: method registry, server options and the HTTP dispatch router.
//!
//! # Wire format
//! ```text
//! POST /{package.Service}/{Method}     body: JSON request message
//!   unary            → 200 + JSON response message
//!   server-streaming → 200 + application/x-ndjson, one frame per line:
//!                        {"result": <message>} | {"error": <status>}
//!   failure          → mapped HTTP status + JSON status + x-rpc-status header
//! ```

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderValue, Uri},
    response::{IntoResponse, Response},
    routing::{post, MethodRouter},
    extract::DefaultBodyLimit,
    Json, Router,
};
use futures_util::stream::{Stream, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::observability::metrics;
use crate::rpc::interceptor::{
    chain_stream, chain_unary, RpcContext, StreamHandler, StreamInterceptor, UnaryHandler,
    UnaryInterceptor, ValueStream,
};
use crate::rpc::status::{Code, Status};

/// Content type of server-streaming responses.
pub const NDJSON: &str = "application/x-ndjson";

/// One line of a server-streaming response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFrame {
    Result(Value),
    Error(Status),
}

/// Options applied when an [`RpcServer`] is constructed.
#[derive(Clone)]
pub enum ServerOption {
    /// Appended to the unary chain, after any interceptor already present.
    UnaryInterceptor(UnaryInterceptor),
    /// Appended to the streaming chain.
    StreamInterceptor(StreamInterceptor),
    /// Deadline for unary calls and for opening streams.
    RequestTimeout(Duration),
    /// Upper bound on request body size.
    MaxRequestBytes(usize),
}

impl ServerOption {
    pub fn unary_interceptor<F, Fut>(f: F) -> Self
    where
        F: Fn(RpcContext, Value, UnaryHandler) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Status>> + Send + 'static,
    {
        Self::UnaryInterceptor(UnaryInterceptor::new(f))
    }

    pub fn stream_interceptor<F, Fut>(f: F) -> Self
    where
        F: Fn(RpcContext, Value, StreamHandler) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ValueStream, Status>> + Send + 'static,
    {
        Self::StreamInterceptor(StreamInterceptor::new(f))
    }
}

#[derive(Clone)]
enum MethodHandler {
    Unary(UnaryHandler),
    ServerStreaming(StreamHandler),
}

/// An RPC server under construction.
///
/// Services are attached by registration callbacks; the server is turned into
/// an HTTP router when the web service is built.
#[derive(Clone, Default)]
pub struct RpcServer {
    methods: BTreeMap<String, MethodHandler>,
    unary_interceptors: Vec<UnaryInterceptor>,
    stream_interceptors: Vec<StreamInterceptor>,
    request_timeout: Option<Duration>,
    max_request_bytes: Option<usize>,
    duplicates: Vec<String>,
}

impl RpcServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: impl IntoIterator<Item = ServerOption>) -> Self {
        let mut server = Self::default();
        for option in options {
            match option {
                ServerOption::UnaryInterceptor(i) => server.unary_interceptors.push(i),
                ServerOption::StreamInterceptor(i) => server.stream_interceptors.push(i),
                ServerOption::RequestTimeout(d) => server.request_timeout = Some(d),
                ServerOption::MaxRequestBytes(n) => server.max_request_bytes = Some(n),
            }
        }
        server
    }

    /// Register a typed unary method.
    pub fn add_unary<Req, Resp, F, Fut>(&mut self, service: &str, method: &str, f: F) -> &mut Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(RpcContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        let f = Arc::new(f);
        let handler = UnaryHandler::new(move |ctx, value| {
            let f = f.clone();
            async move {
                let req: Req = decode_message(value)?;
                let resp = f(ctx, req).await?;
                encode_message(resp)
            }
        });
        self.insert(service, method, MethodHandler::Unary(handler))
    }

    /// Register a typed server-streaming method.
    pub fn add_server_streaming<Req, Resp, F, Fut, S>(
        &mut self,
        service: &str,
        method: &str,
        f: F,
    ) -> &mut Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(RpcContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, Status>> + Send + 'static,
        S: Stream<Item = Result<Resp, Status>> + Send + 'static,
    {
        let f = Arc::new(f);
        let handler = StreamHandler::new(move |ctx, value| {
            let f = f.clone();
            async move {
                let req: Req = decode_message(value)?;
                let frames = f(ctx, req).await?;
                let frames: ValueStream = frames
                    .map(|frame| frame.and_then(encode_message))
                    .boxed();
                Ok::<_, Status>(frames)
            }
        });
        self.insert(service, method, MethodHandler::ServerStreaming(handler))
    }

    /// Register an untyped unary method.
    pub fn add_unary_handler(&mut self, service: &str, method: &str, handler: UnaryHandler) -> &mut Self {
        self.insert(service, method, MethodHandler::Unary(handler))
    }

    /// Whether any method of `service` is registered.
    pub fn has_service(&self, service: &str) -> bool {
        let prefix = format!("/{service}/");
        self.methods.keys().any(|path| path.starts_with(&prefix))
    }

    /// Full paths of all registered methods, sorted.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    fn insert(&mut self, service: &str, method: &str, handler: MethodHandler) -> &mut Self {
        let path = format!("/{service}/{method}");
        if self.methods.contains_key(&path) {
            tracing::warn!(method = %path, "Method registered twice");
            self.duplicates.push(path);
        } else {
            self.methods.insert(path, handler);
        }
        self
    }

    pub(crate) fn take_duplicates(&mut self) -> Vec<String> {
        std::mem::take(&mut self.duplicates)
    }

    /// Build the dispatch router, one POST route per method.
    pub(crate) fn into_router(self) -> Router {
        let mut unary_chain = self.unary_interceptors;
        let mut stream_chain = self.stream_interceptors;
        if let Some(timeout) = self.request_timeout {
            unary_chain.push(unary_deadline(timeout));
            stream_chain.push(stream_deadline(timeout));
        }

        let mut router = Router::new();
        for (path, handler) in self.methods {
            let method: Arc<str> = Arc::from(path.as_str());
            let route: MethodRouter = match handler {
                MethodHandler::Unary(handler) => {
                    let handler = chain_unary(&unary_chain, handler);
                    post(move |headers: HeaderMap, body: Bytes| {
                        unary_call(method.clone(), handler.clone(), headers, body)
                    })
                }
                MethodHandler::ServerStreaming(handler) => {
                    let handler = chain_stream(&stream_chain, handler);
                    post(move |headers: HeaderMap, body: Bytes| {
                        stream_call(method.clone(), handler.clone(), headers, body)
                    })
                }
            };
            router = router.route(&path, route);
        }
        if let Some(limit) = self.max_request_bytes {
            router = router.layer(DefaultBodyLimit::max(limit));
        }
        router
    }
}

fn decode_message<T: DeserializeOwned>(value: Value) -> Result<T, Status> {
    serde_json::from_value(value)
        .map_err(|e| Status::invalid_argument(format!("malformed request message: {e}")))
}

fn encode_message<T: Serialize>(message: T) -> Result<Value, Status> {
    serde_json::to_value(message)
        .map_err(|e| Status::internal(format!("malformed response message: {e}")))
}

fn decode_body(body: &[u8]) -> Result<Value, Status> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_slice(body)
        .map_err(|e| Status::invalid_argument(format!("request body is not JSON: {e}")))
}

fn unary_deadline(timeout: Duration) -> UnaryInterceptor {
    UnaryInterceptor::new(move |ctx, req, next: UnaryHandler| async move {
        match tokio::time::timeout(timeout, next.call(ctx, req)).await {
            Ok(result) => result,
            Err(_) => Err(Status::deadline_exceeded(format!(
                "call exceeded {}ms",
                timeout.as_millis()
            ))),
        }
    })
}

fn stream_deadline(timeout: Duration) -> StreamInterceptor {
    StreamInterceptor::new(move |ctx, req, next: StreamHandler| async move {
        match tokio::time::timeout(timeout, next.call(ctx, req)).await {
            Ok(result) => result,
            Err(_) => Err(Status::deadline_exceeded(format!(
                "opening stream exceeded {}ms",
                timeout.as_millis()
            ))),
        }
    })
}

async fn unary_call(method: Arc<str>, handler: UnaryHandler, headers: HeaderMap, body: Bytes) -> Response {
    let ctx = RpcContext::new(method.clone(), headers);
    let result = match decode_body(&body) {
        Ok(req) => handler.call(ctx, req).await,
        Err(status) => Err(status),
    };
    match result {
        Ok(message) => {
            metrics::record_rpc(&method, Code::Ok);
            Json(message).into_response()
        }
        Err(status) => {
            tracing::debug!(method = %method, code = %status.code, message = %status.message, "RPC call failed");
            metrics::record_rpc(&method, status.code);
            status.into_response()
        }
    }
}

async fn stream_call(method: Arc<str>, handler: StreamHandler, headers: HeaderMap, body: Bytes) -> Response {
    let ctx = RpcContext::new(method.clone(), headers);
    let opened = match decode_body(&body) {
        Ok(req) => handler.call(ctx, req).await,
        Err(status) => Err(status),
    };
    let frames = match opened {
        Ok(frames) => frames,
        Err(status) => {
            metrics::record_rpc(&method, status.code);
            return status.into_response();
        }
    };
    metrics::record_rpc(&method, Code::Ok);
    ndjson_response(frames)
}

/// Stream `frames` as an NDJSON response body.
pub(crate) fn ndjson_response(frames: ValueStream) -> Response {
    let lines = frames.map(|frame| Ok::<_, Infallible>(encode_frame(frame)));
    let mut response = Body::from_stream(lines).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(NDJSON));
    response
}

/// One newline-terminated frame. A frame that fails to encode is replaced by
/// an `Internal` error frame.
fn encode_frame(frame: Result<Value, Status>) -> Bytes {
    let frame = match frame {
        Ok(message) => StreamFrame::Result(message),
        Err(status) => StreamFrame::Error(status),
    };
    let mut line = match serde_json::to_vec(&frame) {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode stream frame");
            let status = Status::internal(format!("malformed stream message: {e}"));
            serde_json::to_vec(&StreamFrame::Error(status))
                .unwrap_or_else(|_| br#"{"error":{"code":"Internal","message":"malformed stream message"}}"#.to_vec())
        }
    };
    line.push(b'\n');
    Bytes::from(line)
}

/// Fallback answer for paths no method is registered at.
pub(crate) async fn unimplemented(uri: Uri) -> Response {
    Status::unimplemented(format!("unknown method {}", uri.path())).into_response()
}
