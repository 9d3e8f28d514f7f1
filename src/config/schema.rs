//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration of a service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerSettings {
    /// RPC listener and server settings.
    pub rpc: RpcSettings,

    /// Companion HTTP listeners.
    pub rest: RestSettings,

    /// Shutdown deadline.
    pub shutdown: ShutdownSettings,

    /// Logging settings.
    pub observability: ObservabilitySettings,
}

/// RPC listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RpcSettings {
    /// Listen address, e.g. ":8080" or "127.0.0.1:8080". Unset means "localhost:0".
    pub address: Option<String>,

    /// Deadline for unary calls and for opening streams.
    pub request_timeout_secs: Option<u64>,

    /// Upper bound on request body size.
    pub max_request_bytes: Option<usize>,
}

impl RpcSettings {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// REST listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RestSettings {
    /// Port of the public listener hosting the gateway.
    pub external_port: Option<u16>,

    /// Port of the internal listener hosting health and debug handlers.
    pub internal_port: Option<u16>,

    /// Deadline of the HTTP health handler's RPC check.
    pub health_timeout_secs: u64,
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            external_port: None,
            internal_port: None,
            health_timeout_secs: 5,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownSettings {
    /// How long stop() waits for listeners to drain.
    pub timeout_secs: u64,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl ShutdownSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilitySettings {
    /// Default log level when RUST_LOG is unset.
    pub log_level: String,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
