//! Bounded retries for idempotent reads.
//!
//! # Design Decisions
//! - Only errors the caller classifies as transient are retried
//! - Attempts are bounded by `RetryConfig::max_attempts`; there is no
//!   unbounded retry anywhere in the crate
//! - Writes are never routed through here

use std::future::Future;

use crate::config::RetryConfig;
use crate::resilience::backoff::calculate_backoff;

/// Run `op` until it succeeds, fails permanently, or attempts run out.
///
/// `is_transient` decides whether an error deserves another attempt.
pub async fn retry_transient<T, E, F, Fut>(
    config: &RetryConfig,
    operation: &'static str,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = if config.enabled { config.max_attempts.max(1) } else { 1 };
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && is_transient(&e) => {
                let delay = calculate_backoff(attempt, config.base_delay_ms, config.max_delay_ms);
                tracing::info!(
                    operation,
                    attempt,
                    delay = ?delay,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
