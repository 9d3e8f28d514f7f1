//! Built-in health checking.
//!
//! # Data Flow
//! ```text
//! RPC:      POST /health.v1.Health/Check  → service.rs (always attached at build)
//! Gateway:  GET /health                   → service.rs route on every gateway mux
//! HTTP:     GET /health                   → handler.rs dials Check, answers "healthy"
//! ```
//!
//! # Design Decisions
//! - The RPC service is attached unconditionally; startup pings it
//! - Registration is skipped when the caller already registered the service

pub mod handler;
pub mod service;

pub use handler::http_handler;
pub use service::{register_gateway, register_service, CheckRequest, CheckResponse, ServingStatus};

/// Fully qualified health service name.
pub const HEALTH_SERVICE: &str = "health.v1.Health";

/// Full method path of the health check.
pub const CHECK_METHOD: &str = "/health.v1.Health/Check";

/// HTTP path of the health gateway route and of the plain HTTP handler.
pub const HEALTH_PATH: &str = "/health";
