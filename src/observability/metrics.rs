//! Metrics collection and exposition.
//!
//! # Metrics
//! - `pevpot_gateway_requests_total` (counter): chain API calls by op, outcome
//! - `pevpot_broadcasts_total` (counter): push attempts by endpoint, accepted
//! - `pevpot_reconciliations_total` (counter): reconcile runs by owner kind, outcome
//! - `pevpot_payments_recorded_total` (counter): payments written by owner kind
//! - `pevpot_scan_watermark` (gauge): watermark per tracked address
//! - `pevpot_draw_finalizations_total` (counter): draw finalizations by outcome
//! - `pevpot_sweeps_total` (counter): forwarding sweeps by outcome
//! - `pevpot_stretch_duration_seconds` (histogram): PBKDF2 wall time
//! - `pevpot_jobs_total` (counter): scheduler jobs by name, outcome

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "metrics exporter listening");
    Ok(())
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

pub fn record_gateway_request(operation: &'static str, ok: bool) {
    metrics::counter!(
        "pevpot_gateway_requests_total",
        "op" => operation,
        "outcome" => outcome(ok)
    )
    .increment(1);
}

pub fn record_broadcast(endpoint: &str, ok: bool) {
    metrics::counter!(
        "pevpot_broadcasts_total",
        "endpoint" => endpoint.to_string(),
        "accepted" => if ok { "true" } else { "false" }
    )
    .increment(1);
}

pub fn record_reconciliation(owner: &str, result: &str) {
    metrics::counter!(
        "pevpot_reconciliations_total",
        "owner" => owner.to_string(),
        "outcome" => result.to_string()
    )
    .increment(1);
}

pub fn record_payments(owner: &str, count: u64) {
    metrics::counter!("pevpot_payments_recorded_total", "owner" => owner.to_string()).increment(count);
}

pub fn set_watermark(address: &str, height: u64) {
    metrics::gauge!("pevpot_scan_watermark", "owner" => address.to_string()).set(height as f64);
}

pub fn record_finalization(result: &'static str) {
    metrics::counter!("pevpot_draw_finalizations_total", "outcome" => result).increment(1);
}

pub fn record_sweep(result: &'static str) {
    metrics::counter!("pevpot_sweeps_total", "outcome" => result).increment(1);
}

pub fn record_stretch_duration(elapsed: Duration) {
    metrics::histogram!("pevpot_stretch_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_job(job: &'static str, ok: bool) {
    metrics::counter!("pevpot_jobs_total", "job" => job, "outcome" => outcome(ok)).increment(1);
}
