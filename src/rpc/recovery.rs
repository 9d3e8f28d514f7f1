//! Panic recovery for RPC handlers.
//!
//! A panic raised anywhere below the recovery link (later interceptors, the
//! handler itself, or a server stream while it is being polled) is turned into
//! an ordinary [`Status`] answer. Unary and streaming calls share one mapping
//! function, so the error a client sees does not depend on the call shape.

use futures_util::stream::{Stream, StreamExt};
use futures_util::FutureExt;
use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::observability::metrics;
use crate::rpc::interceptor::{
    RpcContext, StreamHandler, StreamInterceptor, UnaryHandler, UnaryInterceptor, ValueStream,
};
use crate::rpc::status::{Code, Status};

/// Panic payload as produced by `std::panic::catch_unwind`.
pub type PanicPayload = Box<dyn Any + Send + 'static>;

/// Maps a recovered panic payload to the status returned to the caller.
pub type PanicHandler = Arc<dyn Fn(PanicPayload) -> Status + Send + Sync>;

/// Default mapping: readable message for string, status and error payloads.
pub fn default_panic_handler(payload: PanicPayload) -> Status {
    let payload = match payload.downcast::<&'static str>() {
        Ok(msg) => return Status::unknown(format!("panic handled, {msg}")),
        Err(other) => other,
    };
    let payload = match payload.downcast::<String>() {
        Ok(msg) => return Status::unknown(format!("panic handled, {msg}")),
        Err(other) => other,
    };
    let payload = match payload.downcast::<Status>() {
        Ok(status) => return Status::new(status.code, format!("panic handled, {}", status.message)),
        Err(other) => other,
    };
    match payload.downcast::<Box<dyn std::error::Error + Send + Sync>>() {
        Ok(err) => Status::unknown(format!("panic handled, {err}")),
        Err(_) => Status::new(Code::Unknown, "panic handled, unknown panic payload"),
    }
}

pub(crate) fn default_handler() -> PanicHandler {
    Arc::new(default_panic_handler)
}

fn recovered(ctx: &RpcContext, handler: &PanicHandler, payload: PanicPayload) -> Status {
    let backtrace = Backtrace::force_capture();
    tracing::error!(
        method = %ctx.method(),
        request_id = ctx.request_id().unwrap_or("unknown"),
        backtrace = %backtrace,
        "Recovered from handler panic"
    );
    metrics::record_panic_recovered(ctx.method());
    handler(payload)
}

/// Unary interceptor that converts panics into a status.
pub fn unary_recovery(handler: PanicHandler) -> UnaryInterceptor {
    UnaryInterceptor::new(move |ctx: RpcContext, req, next: UnaryHandler| {
        let handler = handler.clone();
        async move {
            let call_ctx = ctx.clone();
            // The chain is invoked inside the guarded future so that panics raised
            // while building the next future are caught as well.
            match AssertUnwindSafe(async move { next.call(call_ctx, req).await })
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(payload) => Err(recovered(&ctx, &handler, payload)),
            }
        }
    })
}

/// Streaming interceptor that converts panics into a status, both while the
/// stream is being opened and while its frames are polled.
pub fn stream_recovery(handler: PanicHandler) -> StreamInterceptor {
    StreamInterceptor::new(move |ctx: RpcContext, req, next: StreamHandler| {
        let handler = handler.clone();
        async move {
            let call_ctx = ctx.clone();
            match AssertUnwindSafe(async move { next.call(call_ctx, req).await })
                .catch_unwind()
                .await
            {
                Ok(Ok(stream)) => Ok(RecoveredStream::new(stream, ctx, handler).boxed()),
                Ok(Err(status)) => Err(status),
                Err(payload) => Err(recovered(&ctx, &handler, payload)),
            }
        }
    })
}

/// Stream guard ending the stream with the mapped status on panic.
struct RecoveredStream {
    inner: Option<ValueStream>,
    ctx: RpcContext,
    handler: PanicHandler,
}

impl RecoveredStream {
    fn new(inner: ValueStream, ctx: RpcContext, handler: PanicHandler) -> Self {
        Self {
            inner: Some(inner),
            ctx,
            handler,
        }
    }
}

impl Stream for RecoveredStream {
    type Item = Result<serde_json::Value, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match std::panic::catch_unwind(AssertUnwindSafe(|| inner.poll_next_unpin(cx))) {
            Ok(poll) => poll,
            Err(payload) => {
                this.inner = None;
                Poll::Ready(Some(Err(recovered(&this.ctx, &this.handler, payload))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::interceptor::{chain_stream, chain_unary};
    use axum::http::HeaderMap;
    use serde_json::Value;

    fn ctx() -> RpcContext {
        RpcContext::new("/demo.Demo/Ping", HeaderMap::new())
    }

    #[test]
    fn default_handler_formats_strings() {
        let status = default_panic_handler(Box::new("ohh my god"));
        assert_eq!(status, Status::unknown("panic handled, ohh my god"));

        let status = default_panic_handler(Box::new(String::from("owned")));
        assert_eq!(status.message, "panic handled, owned");
    }

    #[test]
    fn default_handler_keeps_status_code() {
        let status = default_panic_handler(Box::new(Status::not_found("gone")));
        assert_eq!(status.code, Code::NotFound);
        assert_eq!(status.message, "panic handled, gone");
    }

    #[test]
    fn default_handler_formats_errors() {
        let err: Box<dyn std::error::Error + Send + Sync> = "io broke".into();
        let status = default_panic_handler(Box::new(err));
        assert_eq!(status.message, "panic handled, io broke");
    }

    #[test]
    fn default_handler_falls_back_for_other_payloads() {
        let status = default_panic_handler(Box::new(42u32));
        assert_eq!(status.code, Code::Unknown);
        assert_eq!(status.message, "panic handled, unknown panic payload");
    }

    #[tokio::test]
    async fn unary_panic_becomes_status() {
        let handler = UnaryHandler::new(|_ctx, _req| async {
            if true {
                panic!("ohh my god");
            }
            Ok::<_, Status>(Value::Null)
        });
        let chained = chain_unary(&[unary_recovery(default_handler())], handler);

        let err = chained.call(ctx(), Value::Null).await.unwrap_err();
        assert_eq!(err, Status::unknown("panic handled, ohh my god"));
    }

    #[tokio::test]
    async fn panic_in_later_interceptor_is_recovered() {
        let exploding = UnaryInterceptor::new(|_ctx, _req, _next| -> futures_util::future::BoxFuture<'static, Result<Value, Status>> {
            panic!("interceptor exploded")
        });
        let handler = UnaryHandler::new(|_ctx, req| async move { Ok::<_, Status>(req) });
        let custom: PanicHandler = Arc::new(|_payload| Status::internal("custom"));
        let chained = chain_unary(&[unary_recovery(custom), exploding], handler);

        let err = chained.call(ctx(), Value::Null).await.unwrap_err();
        assert_eq!(err, Status::internal("custom"));
    }

    #[tokio::test]
    async fn stream_panic_mid_stream_ends_with_status() {
        let handler = StreamHandler::new(|_ctx, _req| async {
            let frames = futures_util::stream::iter(0..3).map(|i| {
                if i == 2 {
                    panic!("stream exploded");
                }
                Ok::<_, Status>(Value::from(i))
            });
            Ok::<ValueStream, Status>(frames.boxed())
        });
        let chained = chain_stream(&[stream_recovery(default_handler())], handler);

        let stream = chained.call(ctx(), Value::Null).await.unwrap();
        let frames: Vec<_> = stream.collect().await;

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], Ok(Value::from(0)));
        assert_eq!(frames[1], Ok(Value::from(1)));
        assert_eq!(frames[2], Err(Status::unknown("panic handled, stream exploded")));
    }
}
