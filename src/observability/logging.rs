//! Structured logging.
//!
//! `RUST_LOG` wins over the configured level when it is set.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Filter used when neither `RUST_LOG` nor the config names a level.
pub const DEFAULT_FILTER: &str = "pevpot=info,tower_http=info";

/// Build the filter: environment first, then config, then the default.
pub fn build_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let configured = config.log_level.trim();
        if configured.is_empty() {
            EnvFilter::new(DEFAULT_FILTER)
        } else {
            EnvFilter::try_new(configured).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
        }
    })
}

/// Install the global subscriber. Safe to call more than once; later
/// calls are ignored.
pub fn init(config: &ObservabilityConfig) {
    let result = tracing_subscriber::registry()
        .with(build_filter(config))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Minimal subscriber for the CLI: warnings and errors to stderr.
pub fn init_cli(verbose: bool) {
    let level = if verbose { "pevpot=debug" } else { "pevpot=warn" };
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
