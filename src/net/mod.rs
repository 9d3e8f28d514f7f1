//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured address ("", ":8080", "host:port")
//!     → listener.rs (resolve, bind, non-blocking std listener)
//!     → held idle by the web service until run()
//!     → converted to a tokio listener when serving starts
//! ```
//!
//! # Design Decisions
//! - Listeners are bound synchronously at build time, so bind errors surface early
//! - Port 0 is resolved by the OS and read back from the bound socket

pub mod listener;

pub use listener::{create_listener, dial_endpoint, extract_port, ListenerError, DEFAULT_ADDRESS};
