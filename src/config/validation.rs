//! Configuration validation.
//!
//! Serde handles syntax; this pass checks the values make sense together and
//! returns every problem found rather than the first.

use std::fmt;

use crate::config::schema::SettlementConfig;
use crate::keys::{parse_address, parse_network};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting all errors.
pub fn validate_config(config: &SettlementConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match parse_network(&config.chain.network) {
        Ok(network) => {
            if config.lottery.pot_address.is_empty() {
                errors.push(ValidationError::new("lottery.pot_address", "is required"));
            } else if let Err(e) = parse_address(&config.lottery.pot_address, network) {
                errors.push(ValidationError::new("lottery.pot_address", e.to_string()));
            }
        }
        Err(e) => errors.push(ValidationError::new("chain.network", e.to_string())),
    }

    if url::Url::parse(&config.chain.api_url).is_err() {
        errors.push(ValidationError::new("chain.api_url", "is not a valid URL"));
    }
    if config.chain.request_timeout_secs == 0 {
        errors.push(ValidationError::new("chain.request_timeout_secs", "must be > 0"));
    }
    if config.chain.page_size == 0 {
        errors.push(ValidationError::new("chain.page_size", "must be > 0"));
    }

    if config.lottery.blocks_per_draw == 0 {
        errors.push(ValidationError::new("lottery.blocks_per_draw", "must be > 0"));
    }
    if config.lottery.reorg_window == 0 {
        errors.push(ValidationError::new(
            "lottery.reorg_window",
            "must rescan at least one block",
        ));
    }

    if config.stretch.iterations == 0 {
        errors.push(ValidationError::new("stretch.iterations", "must be > 0"));
    }
    if config.stretch.salt.is_empty() {
        errors.push(ValidationError::new("stretch.salt", "must not be empty"));
    }

    if config.forwarding.base_check_interval_secs == 0 {
        errors.push(ValidationError::new(
            "forwarding.base_check_interval_secs",
            "must be > 0",
        ));
    }
    if config.forwarding.backoff_multiplier < 1 {
        errors.push(ValidationError::new("forwarding.backoff_multiplier", "must be >= 1"));
    }

    if config.broadcast.endpoints.len() < 2 {
        errors.push(ValidationError::new(
            "broadcast.endpoints",
            "at least two independent push endpoints are required",
        ));
    }
    for (i, endpoint) in config.broadcast.endpoints.iter().enumerate() {
        if url::Url::parse(&endpoint.url).is_err() {
            errors.push(ValidationError::new(
                &format!("broadcast.endpoints[{}].url", i),
                "is not a valid URL",
            ));
        }
        if endpoint.field.is_empty() {
            errors.push(ValidationError::new(
                &format!("broadcast.endpoints[{}].field", i),
                "must not be empty",
            ));
        }
    }

    for (field, value) in [
        ("keys.sponsor_xpub", &config.keys.sponsor_xpub),
        ("keys.forwarding_xprv", &config.keys.forwarding_xprv),
        ("keys.attestation_wif", &config.keys.attestation_wif),
    ] {
        if value.is_empty() {
            errors.push(ValidationError::new(field, "is required (file or environment)"));
        }
    }

    if config.retries.enabled && config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be > 0"));
    }
    if config.scheduler.job_timeout_secs == 0 {
        errors.push(ValidationError::new("scheduler.job_timeout_secs", "must be > 0"));
    }
    if config.admin.api_key.is_empty() {
        errors.push(ValidationError::new(
            "admin.api_key",
            "is required (file or environment)",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
