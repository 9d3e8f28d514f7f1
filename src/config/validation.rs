//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports distinct)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerSettings → Result<(), Vec<ValidationError>>

use std::fmt;

use crate::config::schema::ServerSettings;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in the settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn error(field: &'static str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field,
        message: message.into(),
    }
}

pub fn validate_config(config: &ServerSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.shutdown.timeout_secs == 0 {
        errors.push(error("shutdown.timeout_secs", "must be greater than 0"));
    }
    if config.rpc.request_timeout_secs == Some(0) {
        errors.push(error("rpc.request_timeout_secs", "must be greater than 0"));
    }
    if config.rpc.max_request_bytes == Some(0) {
        errors.push(error("rpc.max_request_bytes", "must be greater than 0"));
    }
    if config.rest.health_timeout_secs == 0 {
        errors.push(error("rest.health_timeout_secs", "must be greater than 0"));
    }

    let rpc_port = config
        .rpc
        .address
        .as_deref()
        .and_then(|a| a.rsplit_once(':'))
        .and_then(|(_, port)| port.parse::<u16>().ok())
        .filter(|port| *port != 0);
    let rest = &config.rest;
    if let (Some(external), Some(internal)) = (rest.external_port, rest.internal_port) {
        if external == internal {
            errors.push(error("rest.internal_port", "must differ from rest.external_port"));
        }
    }
    for (field, port) in [
        ("rest.external_port", rest.external_port),
        ("rest.internal_port", rest.internal_port),
    ] {
        if port.is_some() && port == rpc_port {
            errors.push(error(field, "must differ from the RPC port"));
        }
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(error(
            "observability.log_level",
            format!("unknown level {:?}", config.observability.log_level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&ServerSettings::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = ServerSettings::default();
        config.rpc.address = Some(":9000".into());
        config.rest.external_port = Some(9000);
        config.rest.internal_port = Some(9000);
        config.shutdown.timeout_secs = 0;
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "shutdown.timeout_secs",
                "rest.internal_port",
                "rest.external_port",
                "rest.internal_port",
                "observability.log_level",
            ]
        );
    }
}
