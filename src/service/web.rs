//! The running service handle.

use futures_util::future::join_all;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::binding::ListenerBinding;
use super::errors::ServiceError;
use super::ListenInfo;
use crate::observability::logging::LogSink;

#[derive(Debug, Default)]
struct RunState {
    closed: bool,
    running: bool,
}

struct Inner {
    bindings: Vec<Arc<ListenerBinding>>,
    ports: Vec<ListenInfo>,
    rpc_address: SocketAddr,
    state: Mutex<RunState>,
    log: LogSink,
}

/// A built service: one RPC listener plus its companion REST listeners.
///
/// Cheap to clone; clones share the same listeners and state.
#[derive(Clone)]
pub struct WebService {
    inner: Arc<Inner>,
}

impl WebService {
    pub(crate) fn new(
        bindings: Vec<ListenerBinding>,
        ports: Vec<ListenInfo>,
        rpc_address: SocketAddr,
        log: LogSink,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                bindings: bindings.into_iter().map(Arc::new).collect(),
                ports,
                rpc_address,
                state: Mutex::new(RunState::default()),
                log,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve every listener until the service is stopped.
    ///
    /// Returns `Ok(())` after a graceful stop, or the first serve failure (which
    /// also stops the remaining listeners).
    pub async fn run(&self) -> Result<(), ServiceError> {
        let mut results = {
            let mut state = self.state();
            if state.closed {
                return Err(ServiceError::AlreadyClosed);
            }
            if state.running {
                return Err(ServiceError::AlreadyRunning);
            }
            state.running = true;

            let (tx, rx) = mpsc::channel(self.inner.bindings.len().max(1));
            for binding in &self.inner.bindings {
                let binding = binding.clone();
                let service = self.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let result = binding.serve().await;
                    if let Err(e) = &result {
                        tracing::error!(address = %binding.address(), error = %e, "Listener failed");
                    }
                    let _ = tx.send(result).await;
                    let _ = service.stop_until(std::future::pending::<()>()).await;
                });
            }
            rx
        };

        results.recv().await.unwrap_or(Ok(()))
    }

    /// Gracefully stop every listener, waiting at most `timeout`.
    pub async fn stop(&self, timeout: Duration) -> Result<(), ServiceError> {
        let deadline = Instant::now().checked_add(timeout);
        // An expired deadline must win the first poll.
        let expired = async move {
            match deadline {
                Some(deadline) if Instant::now() >= deadline => {}
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        match self.stop_until(expired).await {
            Err(ServiceError::Cancelled) => Err(ServiceError::DeadlineExceeded(timeout)),
            other => other,
        }
    }

    /// Gracefully stop every listener, waiting until done or until `signal` fires.
    ///
    /// When `signal` wins the wait returns `Cancelled`; draining continues in
    /// the background. Calling this on a closed service is a no-op.
    pub async fn stop_until<F>(&self, signal: F) -> Result<(), ServiceError>
    where
        F: Future<Output = ()>,
    {
        let drained = {
            let mut state = self.state();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            (self.inner.log)(format_args!("Shutting down..."));
            tracing::info!(listeners = self.inner.bindings.len(), "Shutting down");

            let tasks: Vec<_> = self
                .inner
                .bindings
                .iter()
                .map(|binding| {
                    let binding = binding.clone();
                    let log = self.inner.log.clone();
                    tokio::spawn(async move { binding.graceful_stop(&log).await })
                })
                .collect();
            join_all(tasks)
        };

        tokio::select! {
            biased;
            _ = signal => Err(ServiceError::Cancelled),
            _ = drained => Ok(()),
        }
    }

    /// Listening endpoints: RPC first, then REST in registration order.
    pub fn ports(&self) -> Vec<ListenInfo> {
        self.inner.ports.clone()
    }

    /// Bound address of the RPC listener.
    pub fn rpc_address(&self) -> SocketAddr {
        self.inner.rpc_address
    }
}
