//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the settlement
//! daemon. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Environment variable overriding `keys.forwarding_xprv`.
pub const FORWARDING_XPRV_ENV_VAR: &str = "PEVPOT_FORWARDING_XPRV";
/// Environment variable overriding `keys.attestation_wif`.
pub const ATTESTATION_WIF_ENV_VAR: &str = "PEVPOT_ATTESTATION_WIF";
/// Environment variable overriding `keys.sponsor_xpub`.
pub const SPONSOR_XPUB_ENV_VAR: &str = "PEVPOT_SPONSOR_XPUB";
/// Environment variable overriding `chain.api_key`.
pub const CHAIN_API_KEY_ENV_VAR: &str = "PEVPOT_CHAIN_API_KEY";
/// Environment variable overriding `admin.api_key`.
pub const ADMIN_API_KEY_ENV_VAR: &str = "PEVPOT_ADMIN_API_KEY";

/// Root configuration for the settlement daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SettlementConfig {
    /// Ledger database location.
    pub ledger: LedgerConfig,

    /// Chain data provider.
    pub chain: ChainConfig,

    /// Draw windows, pot address and dust threshold.
    pub lottery: LotteryConfig,

    /// Block hash stretching parameters.
    pub stretch: StretchConfig,

    /// Forwarding sweep fee and scheduling.
    pub forwarding: ForwardingConfig,

    /// Transaction push endpoints.
    pub broadcast: BroadcastConfig,

    /// Root key material.
    pub keys: KeyConfig,

    /// Retry configuration for gateway reads.
    pub retries: RetryConfig,

    /// Background job scheduling.
    pub scheduler: SchedulerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Operational HTTP surface.
    pub admin: AdminConfig,
}

impl SettlementConfig {
    /// Apply secret overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(FORWARDING_XPRV_ENV_VAR) {
            self.keys.forwarding_xprv = v;
        }
        if let Some(v) = lookup(ATTESTATION_WIF_ENV_VAR) {
            self.keys.attestation_wif = v;
        }
        if let Some(v) = lookup(SPONSOR_XPUB_ENV_VAR) {
            self.keys.sponsor_xpub = v;
        }
        if let Some(v) = lookup(CHAIN_API_KEY_ENV_VAR) {
            self.chain.api_key = v;
        }
        if let Some(v) = lookup(ADMIN_API_KEY_ENV_VAR) {
            self.admin.api_key = v;
        }
    }
}

/// Ledger database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Path to the SQLite database file.
    pub path: String,

    /// Milliseconds SQLite waits on a locked database before reporting busy.
    pub busy_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: "pevpot.db".to_string(),
            busy_timeout_ms: 5000,
        }
    }
}

/// Chain data provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Provider REST base URL.
    pub api_url: String,

    /// Provider API key, sent as the `api_key` query parameter.
    pub api_key: String,

    /// Bitcoin network name ("bitcoin", "testnet", "signet", "regtest").
    pub network: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Page size requested from paginated endpoints.
    pub page_size: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.blocktrail.com/v1/btc".to_string(),
            api_key: String::new(),
            network: "bitcoin".to_string(),
            request_timeout_secs: 20,
            page_size: 200,
        }
    }
}

/// Lottery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LotteryConfig {
    /// Collection address every ticket payment is sent to.
    pub pot_address: String,

    /// Height the first draw window starts after.
    pub starting_block: u64,

    /// Blocks in each draw window.
    pub blocks_per_draw: u64,

    /// Blocks after the draw end whose hash seeds the draw.
    pub hash_confirmation_offset: u64,

    /// Blocks behind the previous watermark rescanned on every pass.
    pub reorg_window: u64,

    /// Payments below this many satoshis are dust.
    pub dust_threshold: u64,
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            pot_address: String::new(),
            starting_block: 383_000,
            blocks_per_draw: 1000,
            hash_confirmation_offset: 6,
            reorg_window: 6,
            dust_threshold: 10_000,
        }
    }
}

/// Block hash stretching configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StretchConfig {
    /// PBKDF2 salt.
    pub salt: String,

    /// PBKDF2-HMAC-SHA256 iteration count.
    pub iterations: u64,
}

impl Default for StretchConfig {
    fn default() -> Self {
        Self {
            salt: "pevpot".to_string(),
            iterations: 5_000_000_000,
        }
    }
}

/// Forwarding sweep configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Fee rate in satoshis per 1000 serialized bytes.
    pub fee_per_kb: u64,

    /// Interval a successful forward resets the next check to, in seconds.
    pub base_check_interval_secs: u64,

    /// Factor applied to the interval after a due check found nothing.
    pub backoff_multiplier: u64,

    /// Maximum addresses swept per poll.
    pub batch_limit: u32,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            fee_per_kb: 15_000,
            base_check_interval_secs: 600,
            backoff_multiplier: 3,
            batch_limit: 100,
        }
    }
}

/// Encoding of the raw transaction in a push request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushEncoding {
    /// `{"<field>": "<hex>"}` JSON body.
    Json,
    /// `<field>=<hex>` form body.
    Form,
}

/// One push endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushEndpointConfig {
    /// Name used in logs and metrics.
    pub name: String,

    /// Endpoint URL.
    pub url: String,

    /// Body encoding.
    pub encoding: PushEncoding,

    /// Body field carrying the hex.
    pub field: String,
}

/// Broadcast configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Independent push endpoints, all attempted in parallel.
    pub endpoints: Vec<PushEndpointConfig>,

    /// Per-push timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                PushEndpointConfig {
                    name: "blockr".to_string(),
                    url: "https://btc.blockr.io/api/v1/tx/push".to_string(),
                    encoding: PushEncoding::Json,
                    field: "hex".to_string(),
                },
                PushEndpointConfig {
                    name: "blockchain.info".to_string(),
                    url: "https://blockchain.info/pushtx".to_string(),
                    encoding: PushEncoding::Form,
                    field: "tx".to_string(),
                },
            ],
            timeout_secs: 30,
        }
    }
}

/// Root key material. Prefer the environment over the file for the private parts.
#[derive(Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct KeyConfig {
    /// Extended public key sponsor deposit addresses are derived from.
    pub sponsor_xpub: String,

    /// Extended private key forwarding deposit keys are derived from.
    pub forwarding_xprv: String,

    /// WIF of the attestation key that signs guarantees.
    pub attestation_wif: String,
}

impl std::fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyConfig")
            .field("sponsor_xpub", &self.sponsor_xpub)
            .field("forwarding_xprv", &"<redacted>")
            .field("attestation_wif", &"<redacted>")
            .finish()
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Maximum number of attempts, the first included.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 5000,
        }
    }
}

/// Background job configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Run the poll loops at all.
    pub enabled: bool,

    /// Seconds between block polls (pot + sponsor reconciliation, draws).
    pub block_poll_secs: u64,

    /// Seconds between forwarding polls.
    pub forwarding_poll_secs: u64,

    /// Deadline for a single job in seconds. Stretching is exempt.
    pub job_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            block_poll_secs: 120,
            forwarding_poll_secs: 600,
            job_timeout_secs: 300,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Operational HTTP surface configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bind address for hooks and admin routes.
    pub bind_address: String,

    /// API key for admin routes (Bearer token).
    pub api_key: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            api_key: String::new(),
            request_timeout_secs: 60,
        }
    }
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("bind_address", &self.bind_address)
            .field("api_key", &"<redacted>")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}
