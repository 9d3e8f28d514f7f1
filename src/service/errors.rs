//! Build and runtime errors of the web service.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::net::ListenerError;

/// Errors detected while materializing a service. No listener stays open.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no RPC services registered")]
    NoServicesRegistered,

    #[error(transparent)]
    Listener(#[from] ListenerError),

    /// The same literal pattern was registered twice on one listener.
    #[error("pattern {pattern:?} registered more than once on {address}")]
    PatternConflict { address: SocketAddr, pattern: String },

    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A literal "/" handler leaves no room for the gateway.
    #[error("pattern \"/\" on {address} is taken, cannot mount the gateway there")]
    RootPatternTaken { address: SocketAddr },

    #[error("nothing to handle for this address {address}")]
    NothingToHandle { address: SocketAddr },

    #[error("RPC method {method} registered more than once")]
    DuplicateMethod { method: String },

    /// Configs sharing one listener cannot be merged.
    #[error("servers sharing {address} conflict: {reason}")]
    ListenerConflict { address: SocketAddr, reason: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Errors returned by `run` and `stop`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service already closed")]
    AlreadyClosed,

    #[error("service is already running")]
    AlreadyRunning,

    #[error("serving {address} failed: {source}")]
    Serve {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Listeners were still draining when the deadline passed.
    #[error("shutdown did not finish within {0:?}")]
    DeadlineExceeded(Duration),

    /// The caller's signal fired before listeners drained.
    #[error("shutdown wait cancelled")]
    Cancelled,
}
