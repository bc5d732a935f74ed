//! Forwarding sweep engine.
//!
//! # Data Flow
//! ```text
//! due forwarding index
//!   -> KeyService::derive_forwarding_key
//!   -> ChainGateway::address_unspent
//!   -> builder (zero-fee draft, measure, re-sign with fee)
//!   -> BroadcastPool (every endpoint at once, first acceptance wins)
//!   -> ledger schedule update
//! ```
//!
//! # Design Decisions
//! - Legacy P2PKH only; forwarding addresses are P2PKH
//! - A sweep that finds nothing worth sending is a success
//! - The schedule is written only after the sweep settled

pub mod builder;
pub mod engine;
pub mod fee;

pub use builder::{build_sweep, SignedSweep};
pub use engine::{SweepEngine, SweepOutcome, SweepParams};
pub use fee::fee_for_size;
