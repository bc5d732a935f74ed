//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway read:
//!     → tokio::time::timeout (every external call has a deadline)
//!     → On transient failure: retries.rs (bounded, backoff.rs delays)
//!
//! Broadcast:
//!     → fanout.rs (all endpoints concurrently, first success wins)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; the core carries none, so callers impose them
//! - Retries only for idempotent reads
//! - Ledger writes never retry here; the ledger retries busy/locked once itself

pub mod backoff;
pub mod fanout;
pub mod retries;
