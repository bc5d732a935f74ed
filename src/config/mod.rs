//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! pevpot.toml
//!     → loader.rs (parse & deserialize)
//!     → schema.rs (environment overrides for secrets)
//!     → validation.rs (semantic checks)
//!     → SettlementConfig (validated, immutable)
//!     → handed to each subsystem at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Private keys are expected from the environment, never logged

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, BroadcastConfig, ChainConfig, ForwardingConfig, KeyConfig, LedgerConfig,
    LotteryConfig, ObservabilityConfig, PushEncoding, PushEndpointConfig, RetryConfig,
    SchedulerConfig, SettlementConfig, StretchConfig,
};
