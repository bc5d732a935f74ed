//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, EnvFilter-controlled)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer, optionally JSON)
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Log fields carry draw ids, addresses and txids, never key material
//! - Metric helpers are free functions so call sites stay one line
//! - With no exporter installed the metric calls are no-ops

pub mod logging;
pub mod metrics;
