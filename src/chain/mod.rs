//! Chain data gateway.
//!
//! # Data Flow
//! ```text
//! Reconciler / DrawProcessor / SweepEngine
//!     → ChainGateway (height, hash by height, history pages, unspent)
//!         → client.rs (REST provider over reqwest, timeout + bounded retry)
//!         → memory.rs (deterministic in-process chain)
//!
//! SweepEngine
//!     → broadcast.rs (BroadcastPool: fan out to every Broadcaster,
//!                     success when any endpoint accepts)
//! ```
//!
//! # Design Decisions
//! - Provider pagination and ordering live behind the trait; callers only see
//!   `HistoryPage` (descending height, unconfirmed first)
//! - Every network call carries its own deadline
//! - Broadcasting is a separate trait so push endpoints can differ from the
//!   data provider

pub mod broadcast;
pub mod client;
pub mod memory;
pub mod types;

use async_trait::async_trait;

pub use broadcast::{BroadcastPool, PushEndpoint};
pub use client::RestChainGateway;
pub use memory::{InMemoryChain, ScriptedBroadcaster};
pub use types::{ChainTx, GatewayError, GatewayResult, HistoryPage, TxInput, TxOutput, Unspent};

/// Read access to chain data.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Current best block height.
    async fn height(&self) -> GatewayResult<u64>;

    /// Block hash (hex) at `height`; `GatewayError::NotMined` if it does not exist yet.
    async fn hash_at_height(&self, height: u64) -> GatewayResult<String>;

    /// One page (1-based) of an address's history, newest first.
    async fn address_history_page(&self, address: &str, page: u32) -> GatewayResult<HistoryPage>;

    /// Every unspent output currently owned by `address`.
    async fn address_unspent(&self, address: &str) -> GatewayResult<Vec<Unspent>>;
}

/// A single transaction push endpoint.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Endpoint name for logs and metrics.
    fn name(&self) -> &str;

    /// Submit a raw transaction; `Ok(true)` when the endpoint accepted it.
    async fn push_transaction(&self, raw_hex: &str) -> GatewayResult<bool>;
}
