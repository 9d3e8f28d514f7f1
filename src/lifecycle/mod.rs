//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Spawn run() → Ping RPC health → Log accepted ports
//!
//! Shutdown (shutdown.rs):
//!     stop() → Trigger per-listener shutdown → Drain in-flight requests → Latch drained
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Resolve the shutdown future the binary waits on
//! ```
//!
//! # Design Decisions
//! - Shutdown has a caller-supplied deadline; draining keeps going after it expires
//! - Triggers are level-triggered, so late subscribers still observe them

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
pub use startup::{start, StartupError};
