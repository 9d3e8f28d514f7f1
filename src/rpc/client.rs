//! RPC client over the hyper connection pool.
//!
//! Used by the gateway to dial back into the RPC server, by the startup health
//! ping and by tests.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request};
use futures_util::stream::{BoxStream, StreamExt};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::rpc::interceptor::ValueStream;
use crate::rpc::server::StreamFrame;
use crate::rpc::status::{Code, Status};

/// Upper bound on a unary response or error body.
const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// Client for one RPC endpoint.
#[derive(Clone)]
pub struct RpcClient {
    base: String,
    client: Client<HttpConnector, Body>,
}

impl RpcClient {
    /// `endpoint` is `host:port`, optionally prefixed with `http://`.
    pub fn new(endpoint: impl AsRef<str>) -> Self {
        let endpoint = endpoint.as_ref().trim_end_matches('/');
        let base = if endpoint.starts_with("http://") {
            endpoint.to_string()
        } else {
            format!("http://{endpoint}")
        };
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { base, client }
    }

    pub fn endpoint(&self) -> &str {
        &self.base
    }

    /// Typed unary call; `method` is the full path, e.g. `/demo.Demo/Ping`.
    pub async fn call<Req, Resp>(&self, method: &str, req: &Req) -> Result<Resp, Status>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let req = serde_json::to_value(req)
            .map_err(|e| Status::internal(format!("malformed request message: {e}")))?;
        let resp = self.call_value(method, &HeaderMap::new(), req).await?;
        serde_json::from_value(resp)
            .map_err(|e| Status::internal(format!("malformed response message: {e}")))
    }

    /// Untyped unary call forwarding `metadata` as request headers.
    pub async fn call_value(&self, method: &str, metadata: &HeaderMap, req: Value) -> Result<Value, Status> {
        let response = self.send(method, metadata, &req).await?;
        if !response.status().is_success() {
            return Err(status_from_response(response).await);
        }
        let bytes = axum::body::to_bytes(response.into_body(), MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| Status::unavailable(format!("reading response failed: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Status::internal(format!("response body is not JSON: {e}")))
    }

    /// Typed server-streaming call.
    pub async fn server_stream<Req, Resp>(
        &self,
        method: &str,
        req: &Req,
    ) -> Result<BoxStream<'static, Result<Resp, Status>>, Status>
    where
        Req: Serialize,
        Resp: DeserializeOwned + Send + 'static,
    {
        let req = serde_json::to_value(req)
            .map_err(|e| Status::internal(format!("malformed request message: {e}")))?;
        let frames = self.server_stream_value(method, &HeaderMap::new(), req).await?;
        Ok(frames
            .map(|frame| {
                frame.and_then(|value| {
                    serde_json::from_value(value)
                        .map_err(|e| Status::internal(format!("malformed stream message: {e}")))
                })
            })
            .boxed())
    }

    /// Untyped server-streaming call.
    pub async fn server_stream_value(
        &self,
        method: &str,
        metadata: &HeaderMap,
        req: Value,
    ) -> Result<ValueStream, Status> {
        let response = self.send(method, metadata, &req).await?;
        if !response.status().is_success() {
            return Err(status_from_response(response).await);
        }
        Ok(ndjson_frames(response.into_body(), MAX_RESPONSE_BYTES))
    }

    async fn send(
        &self,
        method: &str,
        metadata: &HeaderMap,
        req: &Value,
    ) -> Result<axum::http::Response<Body>, Status> {
        let body = serde_json::to_vec(req)
            .map_err(|e| Status::internal(format!("malformed request message: {e}")))?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(format!("{}{}", self.base, method));
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in metadata {
                headers.append(name.clone(), value.clone());
            }
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        let request = builder
            .body(Body::from(body))
            .map_err(|e| Status::internal(format!("invalid request: {e}")))?;

        let response: axum::http::Response<Incoming> = self.client.request(request).await.map_err(|e| {
            tracing::debug!(endpoint = %self.base, method = %method, error = %e, "RPC transport error");
            Status::unavailable(format!("connection to {} failed: {e}", self.base))
        })?;
        let (parts, body) = response.into_parts();
        Ok(axum::http::Response::from_parts(parts, Body::new(body)))
    }
}

async fn status_from_response(response: axum::http::Response<Body>) -> Status {
    let http_status = response.status();
    let decoded = axum::body::to_bytes(response.into_body(), MAX_RESPONSE_BYTES)
        .await
        .ok()
        .and_then(|bytes| serde_json::from_slice::<Status>(&bytes).ok());
    decoded.unwrap_or_else(|| {
        Status::new(
            Code::from_http_status(http_status),
            format!("unexpected HTTP status {http_status}"),
        )
    })
}

fn parse_frame(line: &[u8]) -> Result<Value, Status> {
    match serde_json::from_slice::<StreamFrame>(line) {
        Ok(StreamFrame::Result(value)) => Ok(value),
        Ok(StreamFrame::Error(status)) => Err(status),
        Err(e) => Err(Status::internal(format!("malformed stream frame: {e}"))),
    }
}

/// Split an NDJSON body into frames of at most `max_line` bytes.
fn ndjson_frames(body: Body, max_line: usize) -> ValueStream {
    let data = body.into_data_stream();
    futures_util::stream::unfold((data, Vec::new(), false), move |(mut data, mut buf, mut done)| async move {
        loop {
            if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                let line = &line[..line.len() - 1];
                if line.is_empty() {
                    continue;
                }
                return Some((parse_frame(line), (data, buf, done)));
            }
            if done {
                if buf.is_empty() {
                    return None;
                }
                let line = std::mem::take(&mut buf);
                return Some((parse_frame(&line), (data, buf, done)));
            }
            match data.next().await {
                Some(Ok(chunk)) => {
                    buf.extend_from_slice(&chunk);
                    if buf.len() > max_line && !buf.contains(&b'\n') {
                        let status = Status::new(
                            Code::ResourceExhausted,
                            format!("stream frame exceeds {max_line} bytes"),
                        );
                        return Some((Err(status), (data, Vec::new(), true)));
                    }
                }
                Some(Err(e)) => {
                    let status = Status::unavailable(format!("stream interrupted: {e}"));
                    return Some((Err(status), (data, Vec::new(), true)));
                }
                None => done = true,
            }
        }
    })
    .boxed()
}
