//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Open ledger → Keys → Gateway → Engines → Scheduler
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Scheduler loop exits → HTTP drains → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Jobs already inside a ledger unit of work finish before exit

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Services, StartupError};
