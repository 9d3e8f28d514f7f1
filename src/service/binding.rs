//! One bound listener and the router it serves.

use axum::Router;
use std::mem;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use super::errors::ServiceError;
use super::ServerKind;
use crate::lifecycle::Shutdown;
use crate::observability::logging::LogSink;

enum BindingState {
    Idle { listener: TcpListener, app: Router },
    Serving,
    Finished,
}

/// A listener bound at build time, served by `run`, drained by `stop`.
pub(crate) struct ListenerBinding {
    kind: ServerKind,
    address: SocketAddr,
    state: Mutex<BindingState>,
    stop: Shutdown,
    drained: Shutdown,
}

impl ListenerBinding {
    pub(crate) fn new(kind: ServerKind, address: SocketAddr, listener: TcpListener, app: Router) -> Self {
        let app = app
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));
        Self {
            kind,
            address,
            state: Mutex::new(BindingState::Idle { listener, app }),
            stop: Shutdown::new(),
            drained: Shutdown::new(),
        }
    }

    pub(crate) fn address(&self) -> SocketAddr {
        self.address
    }

    fn state(&self) -> MutexGuard<'_, BindingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve until the stop trigger fires. A binding is served at most once.
    pub(crate) async fn serve(&self) -> Result<(), ServiceError> {
        let (listener, app) = {
            let mut state = self.state();
            match mem::replace(&mut *state, BindingState::Serving) {
                BindingState::Idle { listener, app } => (listener, app),
                other => {
                    *state = other;
                    return Ok(());
                }
            }
        };

        let result = self.serve_listener(listener, app).await;

        *self.state() = BindingState::Finished;
        self.drained.trigger();
        tracing::info!(kind = %self.kind, address = %self.address, "Listener stopped");
        result
    }

    async fn serve_listener(&self, listener: TcpListener, app: Router) -> Result<(), ServiceError> {
        let serve_error = |source| ServiceError::Serve {
            address: self.address,
            source,
        };
        listener.set_nonblocking(true).map_err(serve_error)?;
        let listener = tokio::net::TcpListener::from_std(listener).map_err(serve_error)?;

        tracing::info!(kind = %self.kind, address = %self.address, "Serving");
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(self.stop.wait())
            .await
            .map_err(serve_error)
    }

    /// Stop accepting, then wait until in-flight requests finished.
    pub(crate) async fn graceful_stop(&self, log: &LogSink) {
        let serving = {
            let mut state = self.state();
            match mem::replace(&mut *state, BindingState::Finished) {
                BindingState::Idle { listener, .. } => {
                    log(format_args!("closing {} listener {}", self.kind, self.address));
                    drop(listener);
                    false
                }
                BindingState::Serving => {
                    *state = BindingState::Serving;
                    true
                }
                BindingState::Finished => false,
            }
        };

        if serving {
            self.stop.trigger();
            self.drained.wait().await;
            log(format_args!("{} listener {} drained", self.kind, self.address));
        }
    }
}
