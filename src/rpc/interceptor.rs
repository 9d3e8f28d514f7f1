//! Call context, type-erased handlers and the interceptor chain.
//!
//! Handlers and interceptors operate on `serde_json::Value` messages; typed
//! (de)serialization happens at the innermost link, so every interceptor sees
//! the same shape regardless of the method being called.

use axum::http::HeaderMap;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::rpc::status::Status;

/// Header carrying the request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Result of a unary call.
pub type UnaryFuture = BoxFuture<'static, Result<Value, Status>>;

/// Frames produced by a server-streaming call.
pub type ValueStream = BoxStream<'static, Result<Value, Status>>;

/// Result of opening a server-streaming call.
pub type StreamFuture = BoxFuture<'static, Result<ValueStream, Status>>;

/// Per-call information visible to handlers and interceptors.
#[derive(Debug, Clone)]
pub struct RpcContext {
    method: Arc<str>,
    metadata: HeaderMap,
}

impl RpcContext {
    pub fn new(method: impl Into<Arc<str>>, metadata: HeaderMap) -> Self {
        Self {
            method: method.into(),
            metadata,
        }
    }

    /// Full method path, e.g. `/demo.Demo/Ping`.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request metadata (HTTP headers of the call).
    pub fn metadata(&self) -> &HeaderMap {
        &self.metadata
    }

    pub fn request_id(&self) -> Option<&str> {
        self.metadata
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
    }
}

/// Next link of a unary chain.
#[derive(Clone)]
pub struct UnaryHandler(Arc<dyn Fn(RpcContext, Value) -> UnaryFuture + Send + Sync>);

impl UnaryHandler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(RpcContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Status>> + Send + 'static,
    {
        Self(Arc::new(move |ctx, req| f(ctx, req).boxed()))
    }

    pub fn call(&self, ctx: RpcContext, req: Value) -> UnaryFuture {
        (self.0)(ctx, req)
    }
}

/// Next link of a server-streaming chain.
#[derive(Clone)]
pub struct StreamHandler(Arc<dyn Fn(RpcContext, Value) -> StreamFuture + Send + Sync>);

impl StreamHandler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(RpcContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ValueStream, Status>> + Send + 'static,
    {
        Self(Arc::new(move |ctx, req| f(ctx, req).boxed()))
    }

    pub fn call(&self, ctx: RpcContext, req: Value) -> StreamFuture {
        (self.0)(ctx, req)
    }
}

/// Wraps unary calls. Receives the rest of the chain as `next`.
#[derive(Clone)]
pub struct UnaryInterceptor(
    Arc<dyn Fn(RpcContext, Value, UnaryHandler) -> UnaryFuture + Send + Sync>,
);

impl UnaryInterceptor {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(RpcContext, Value, UnaryHandler) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Status>> + Send + 'static,
    {
        Self(Arc::new(move |ctx, req, next| f(ctx, req, next).boxed()))
    }
}

/// Wraps the opening of server-streaming calls.
#[derive(Clone)]
pub struct StreamInterceptor(
    Arc<dyn Fn(RpcContext, Value, StreamHandler) -> StreamFuture + Send + Sync>,
);

impl StreamInterceptor {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(RpcContext, Value, StreamHandler) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ValueStream, Status>> + Send + 'static,
    {
        Self(Arc::new(move |ctx, req, next| f(ctx, req, next).boxed()))
    }
}

/// Compose interceptors around `handler`; the first interceptor is outermost.
pub(crate) fn chain_unary(interceptors: &[UnaryInterceptor], handler: UnaryHandler) -> UnaryHandler {
    interceptors.iter().rev().fold(handler, |next, interceptor| {
        let interceptor = interceptor.clone();
        UnaryHandler(Arc::new(move |ctx, req| (interceptor.0)(ctx, req, next.clone())))
    })
}

pub(crate) fn chain_stream(
    interceptors: &[StreamInterceptor],
    handler: StreamHandler,
) -> StreamHandler {
    interceptors.iter().rev().fold(handler, |next, interceptor| {
        let interceptor = interceptor.clone();
        StreamHandler(Arc::new(move |ctx, req| (interceptor.0)(ctx, req, next.clone())))
    })
}
