//! Chain data types and error definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One input of a transaction as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Owning address, when the provider could decode one.
    pub address: Option<String>,
}

/// One output of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Option<String>,
    pub index: u32,
    /// Value in satoshis.
    pub amount: u64,
}

/// A transaction touching a tracked address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTx {
    pub txid: String,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    /// `None` while unconfirmed.
    pub block_height: Option<u64>,
}

/// One page of address history, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    pub transactions: Vec<ChainTx>,
    /// 1-based page number.
    pub page: u32,
    /// Total transactions across all pages.
    pub total: u64,
    pub per_page: u32,
}

impl HistoryPage {
    /// Number of pages implied by the total.
    pub fn page_count(&self) -> u32 {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(self.per_page as u64) as u32
    }

    pub fn has_more(&self) -> bool {
        self.page < self.page_count()
    }
}

/// An unspent output owned by an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unspent {
    pub txid: String,
    pub vout: u32,
    pub amount: u64,
}

/// Errors that can occur while talking to chain data providers.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport or HTTP-level failure.
    #[error("chain provider error: {0}")]
    Http(String),

    /// Request exceeded its deadline.
    #[error("chain provider timeout after {0} seconds")]
    Timeout(u64),

    /// The requested block does not exist yet.
    #[error("block {0} is not mined yet")]
    NotMined(u64),

    /// Provider refused the request (4xx other than a missing block).
    #[error("chain provider returned status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Provider returned something we cannot interpret.
    #[error("malformed provider response: {0}")]
    Malformed(String),

    /// Every push endpoint rejected or failed the transaction.
    #[error("broadcast rejected by all endpoints: {0}")]
    BroadcastRejected(String),
}

impl GatewayError {
    /// Transport failures and timeouts are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Http(_) | GatewayError::Timeout(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GatewayError::Malformed(e.to_string())
        } else {
            GatewayError::Http(e.to_string())
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
