//! HTTP → RPC gateway subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP request (REST listener fallback)
//!     → mux.rs (match method + path template, registration order breaks ties)
//!     → build request message: JSON body, then query params, then path params
//!     → forward matched headers as RPC metadata
//!     → rpc::client (dial the RPC server over loopback)
//!     → JSON response, NDJSON for server streams, or the error handler
//! ```
//!
//! # Design Decisions
//! - The mux is mounted as the listener's fallback, so literal REST routes win
//! - Routes are registered by callbacks receiving the RPC dial endpoint
//! - One pooled client per distinct endpoint

pub mod mux;
pub mod template;

use axum::http::HeaderName;
use axum::response::Response;
use std::sync::Arc;
use thiserror::Error;

use crate::rpc::status::Status;

pub use mux::GatewayMux;
pub use template::PathTemplate;

/// Errors raised while registering gateway routes.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Same method and template shape registered twice.
    #[error("gateway route {method} {template} is already registered")]
    DuplicateRoute { method: String, template: String },

    #[error("invalid gateway path template {template:?}: {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// Endpoint is not a `host:port` authority.
    #[error("invalid RPC endpoint {0:?}")]
    InvalidEndpoint(String),

    /// RPC method is not of the form `/package.Service/Method`.
    #[error("invalid RPC method {0:?}")]
    InvalidMethod(String),

    /// Failure reported by a registration callback.
    #[error("gateway registration failed: {0}")]
    Registration(String),
}

/// Renders a failed call into the HTTP response sent back to the client.
pub type ErrorHandler = Arc<dyn Fn(Status) -> Response + Send + Sync>;

/// Decides which incoming headers are forwarded as RPC metadata.
pub type HeaderMatcher = Arc<dyn Fn(&HeaderName) -> bool + Send + Sync>;

/// Registers routes on a mux, given the RPC endpoint to dial.
pub type GatewayRegistration = Arc<dyn Fn(&mut GatewayMux, &str) -> Result<(), GatewayError> + Send + Sync>;

/// Options applied when a [`GatewayMux`] is constructed. Later options win.
#[derive(Clone)]
pub enum GatewayOption {
    ErrorHandler(ErrorHandler),
    HeaderMatcher(HeaderMatcher),
}

impl GatewayOption {
    pub fn error_handler<F>(f: F) -> Self
    where
        F: Fn(Status) -> Response + Send + Sync + 'static,
    {
        Self::ErrorHandler(Arc::new(f))
    }

    pub fn header_matcher<F>(f: F) -> Self
    where
        F: Fn(&HeaderName) -> bool + Send + Sync + 'static,
    {
        Self::HeaderMatcher(Arc::new(f))
    }
}

/// Wrap a closure as a [`GatewayRegistration`].
pub fn registration<F>(f: F) -> GatewayRegistration
where
    F: Fn(&mut GatewayMux, &str) -> Result<(), GatewayError> + Send + Sync + 'static,
{
    Arc::new(f)
}
