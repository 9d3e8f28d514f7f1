//! Web service runtime subsystem.
//!
//! # Data Flow
//! ```text
//! ServiceConfig (from the builder)
//!     → assemble.rs (bind listeners, build routers, merge co-located configs)
//!     → binding.rs (one listener + router each, Idle until run)
//!     → web.rs (run: serve all bindings; stop: drain all bindings)
//! ```
//!
//! # Design Decisions
//! - Every listener is bound during build, so bind errors never reach run()
//! - The first binding to finish serving stops the others
//! - stop() is idempotent; its deadline bounds the wait, not the drain

mod assemble;
mod binding;
pub mod errors;
pub mod web;

use serde::{Deserialize, Serialize};
use std::fmt;

pub(crate) use assemble::assemble;
pub use errors::{BuildError, ServiceError};
pub use web::WebService;

/// What a listener serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerKind {
    #[serde(rename = "RPC")]
    Rpc,
    #[serde(rename = "REST")]
    Rest,
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerKind::Rpc => f.write_str("RPC"),
            ServerKind::Rest => f.write_str("REST"),
        }
    }
}

/// A listening endpoint as reported by [`WebService::ports`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenInfo {
    pub address: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub kind: ServerKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_info_wire_shape() {
        let info = ListenInfo {
            address: "127.0.0.1:8080".into(),
            port: 8080,
            kind: ServerKind::Rpc,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json, serde_json::json!({"address": "127.0.0.1:8080", "port": 8080, "type": "RPC"}));
    }
}
