//! Settlement engine for a provably fair, on-chain funded lottery.
//!
//! Payments to the pot are reconciled from a chain data provider into a
//! reorg-tolerant ledger, draws are settled from a stretched future block
//! hash, and per-entrant forwarding addresses are swept into the pot.

pub mod admin;
pub mod chain;
pub mod config;
pub mod error;
pub mod forwarding;
pub mod http;
pub mod keys;
pub mod ledger;
pub mod lifecycle;
pub mod observability;
pub mod reconcile;
pub mod registry;
pub mod resilience;
pub mod scheduler;
pub mod settlement;

pub use config::schema::SettlementConfig;
pub use error::{ErrorKind, SettlementError, SettlementResult};
pub use http::HttpServer;
pub use lifecycle::{Services, Shutdown};
