//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::SettlementConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML document, apply environment overrides and validate.
pub fn parse_config(content: &str) -> Result<SettlementConfig, ConfigError> {
    let mut config: SettlementConfig = toml::from_str(content)?;
    config.apply_env_overrides();
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<SettlementConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [lottery]
        pot_address = "1EA1WP8pcZY4XVLzXEB7CdQKQtysYdV2N2"

        [keys]
        sponsor_xpub = "xpub-placeholder"
        forwarding_xprv = "xprv-placeholder"
        attestation_wif = "wif-placeholder"

        [admin]
        api_key = "admin-secret"
    "#;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.lottery.pot_address, "1EA1WP8pcZY4XVLzXEB7CdQKQtysYdV2N2");
        assert_eq!(config.forwarding.batch_limit, 100);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/pevpot.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let err = parse_config("[lottery").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_errors_are_joined() {
        let err = parse_config("[lottery]\nblocks_per_draw = 0\n").unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("Validation failed: "));
        assert!(text.contains("lottery.blocks_per_draw"));
    }
}
