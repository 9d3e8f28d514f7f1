//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::ServerSettings;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate settings from TOML text.
pub fn parse_config(content: &str) -> Result<ServerSettings, ConfigError> {
    let config: ServerSettings = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate settings from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerSettings, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let settings = parse_config("").unwrap();
        assert!(settings.rpc.address.is_none());
        assert_eq!(settings.shutdown.timeout_secs, 10);
        assert_eq!(settings.observability.log_level, "info");
    }

    #[test]
    fn loads_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[rpc]
address = ":7000"
request_timeout_secs = 3

[rest]
external_port = 7001
internal_port = 7002

[shutdown]
timeout_secs = 2

[observability]
log_level = "debug"
"#
        )
        .unwrap();

        let settings = load_config(file.path()).unwrap();
        assert_eq!(settings.rpc.address.as_deref(), Some(":7000"));
        assert_eq!(settings.rpc.request_timeout(), Some(std::time::Duration::from_secs(3)));
        assert_eq!(settings.rest.external_port, Some(7001));
        assert_eq!(settings.rest.internal_port, Some(7002));
        assert_eq!(settings.shutdown.timeout_secs, 2);
        assert_eq!(settings.observability.log_level, "debug");
    }

    #[test]
    fn parse_and_validation_errors() {
        assert!(matches!(parse_config("[rpc"), Err(ConfigError::Parse(_))));
        let err = parse_config("[shutdown]\ntimeout_secs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
        assert!(err.to_string().starts_with("Validation failed: "));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
