//! Block hash stretching.
//!
//! `PBKDF2-HMAC-SHA256(password = block hash hex text, salt, iterations, 32 bytes)`,
//! hex encoded. Iteration counts in production exceed `u32::MAX`, so the
//! single output block is computed here with a 64-bit round counter.

use std::time::Instant;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::StretchConfig;
use crate::error::{SettlementError, SettlementResult};
use crate::observability::metrics;

type HmacSha256 = Hmac<Sha256>;

/// Check that `value` is 32 bytes of hex and return it lowercased.
pub fn normalize_hash(field: &str, value: &str) -> SettlementResult<String> {
    let trimmed = value.trim();
    if trimmed.len() != 64 || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(SettlementError::validation(format!(
            "{field} must be 64 hex characters"
        )));
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// First PBKDF2 block (32 bytes for SHA-256).
pub fn pbkdf2_block(password: &[u8], salt: &[u8], iterations: u64) -> SettlementResult<[u8; 32]> {
    if iterations == 0 {
        return Err(SettlementError::validation("iterations must be positive"));
    }

    let prf = HmacSha256::new_from_slice(password)
        .map_err(|e| SettlementError::Invariant(format!("hmac key rejected: {e}")))?;

    let mut mac = prf.clone();
    mac.update(salt);
    mac.update(&1u32.to_be_bytes());
    let mut u: [u8; 32] = mac.finalize().into_bytes().into();
    let mut output = u;

    for _ in 1..iterations {
        let mut mac = prf.clone();
        mac.update(&u);
        u = mac.finalize().into_bytes().into();
        for (o, b) in output.iter_mut().zip(u.iter()) {
            *o ^= b;
        }
    }

    Ok(output)
}

/// Deterministic, deliberately slow stretch of a block hash.
#[derive(Debug, Clone)]
pub struct Stretcher {
    salt: String,
    iterations: u64,
}

impl Stretcher {
    pub fn new(salt: impl Into<String>, iterations: u64) -> Self {
        Self {
            salt: salt.into(),
            iterations,
        }
    }

    pub fn from_config(config: &StretchConfig) -> Self {
        Self::new(config.salt.clone(), config.iterations)
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Stretch on the calling thread. CPU bound for a long time at
    /// production iteration counts.
    pub fn stretch_blocking(&self, block_hash: &str) -> SettlementResult<String> {
        let hash = normalize_hash("block_hash", block_hash)?;
        let started = Instant::now();
        let out = pbkdf2_block(hash.as_bytes(), self.salt.as_bytes(), self.iterations)?;
        metrics::record_stretch_duration(started.elapsed());
        Ok(hex::encode(out))
    }

    /// Stretch on the blocking pool.
    pub async fn stretch(&self, block_hash: &str) -> SettlementResult<String> {
        let stretcher = self.clone();
        let block_hash = block_hash.to_string();
        tracing::info!(block_hash = %block_hash, iterations = self.iterations, "Stretching block hash");
        tokio::task::spawn_blocking(move || stretcher.stretch_blocking(&block_hash))
            .await
            .map_err(|e| SettlementError::Invariant(format!("stretch task failed: {e}")))?
    }
}
