//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Runtime, RPC server and gateway produce:
//!     → logging.rs (tracing events, log sink for the web service)
//!     → metrics.rs (counters through the `metrics` facade)
//! ```
//!
//! # Design Decisions
//! - The library never installs a subscriber; the binary does
//! - No metrics recorder ships here; embedders install their own exporter
//! - Request ID flows from the HTTP layer into RPC metadata
//! - Metrics are cheap (atomic increments), no-ops without a recorder

pub mod logging;
pub mod metrics;
