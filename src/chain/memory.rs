//! Deterministic in-process chain and scripted push endpoints.
//!
//! Used by the test suites and for dry runs without a provider.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::chain::types::{ChainTx, GatewayError, GatewayResult, HistoryPage, Unspent};
use crate::chain::{Broadcaster, ChainGateway};

#[derive(Debug, Default)]
struct ChainState {
    height: u64,
    hashes: HashMap<u64, String>,
    transactions: Vec<ChainTx>,
    unspent: HashMap<String, Vec<Unspent>>,
    history_requests: u32,
    offline: bool,
}

/// A chain held in memory. Clones share state.
#[derive(Debug, Clone)]
pub struct InMemoryChain {
    state: Arc<Mutex<ChainState>>,
    page_size: u32,
}

impl Default for InMemoryChain {
    fn default() -> Self {
        Self::new(200)
    }
}

impl InMemoryChain {
    pub fn new(page_size: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainState::default())),
            page_size: page_size.max(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_height(&self, height: u64) {
        self.state().height = height;
    }

    /// Record the hash of block `height`, raising the tip if needed.
    pub fn set_block_hash(&self, height: u64, hash: impl Into<String>) {
        let mut state = self.state();
        state.hashes.insert(height, hash.into());
        state.height = state.height.max(height);
    }

    /// Add (or replace, by txid) a transaction.
    pub fn add_transaction(&self, tx: ChainTx) {
        let mut state = self.state();
        state.transactions.retain(|t| t.txid != tx.txid);
        state.transactions.push(tx);
    }

    /// Remove a transaction, as a reorg would.
    pub fn remove_transaction(&self, txid: &str) {
        self.state().transactions.retain(|t| t.txid != txid);
    }

    /// Move a transaction to `height` (`None` = back to the mempool).
    pub fn set_confirmation(&self, txid: &str, height: Option<u64>) {
        let mut state = self.state();
        for tx in state.transactions.iter_mut().filter(|t| t.txid == txid) {
            tx.block_height = height;
        }
    }

    pub fn set_unspent(&self, address: &str, unspent: Vec<Unspent>) {
        self.state().unspent.insert(address.to_string(), unspent);
    }

    /// Make every call fail with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Number of history pages served so far.
    pub fn history_requests(&self) -> u32 {
        self.state().history_requests
    }

    fn check_online(state: &ChainState) -> GatewayResult<()> {
        if state.offline {
            return Err(GatewayError::Http("chain offline".to_string()));
        }
        Ok(())
    }
}

fn touches(tx: &ChainTx, address: &str) -> bool {
    tx.outputs.iter().any(|o| o.address.as_deref() == Some(address))
        || tx.inputs.iter().any(|i| i.address.as_deref() == Some(address))
}

#[async_trait]
impl ChainGateway for InMemoryChain {
    async fn height(&self) -> GatewayResult<u64> {
        let state = self.state();
        Self::check_online(&state)?;
        Ok(state.height)
    }

    async fn hash_at_height(&self, height: u64) -> GatewayResult<String> {
        let state = self.state();
        Self::check_online(&state)?;
        state
            .hashes
            .get(&height)
            .cloned()
            .ok_or(GatewayError::NotMined(height))
    }

    async fn address_history_page(&self, address: &str, page: u32) -> GatewayResult<HistoryPage> {
        let mut state = self.state();
        Self::check_online(&state)?;
        state.history_requests += 1;

        let mut matching: Vec<ChainTx> = state
            .transactions
            .iter()
            .filter(|tx| touches(tx, address))
            .cloned()
            .collect();

        // Unconfirmed first, then by descending height.
        matching.sort_by(|a, b| {
            let key = |t: &ChainTx| t.block_height.map_or(u64::MAX, |h| h);
            key(b).cmp(&key(a)).then_with(|| a.txid.cmp(&b.txid))
        });

        let total = matching.len() as u64;
        let start = (page.saturating_sub(1) as usize).saturating_mul(self.page_size as usize);
        let transactions = matching
            .into_iter()
            .skip(start)
            .take(self.page_size as usize)
            .collect();

        Ok(HistoryPage {
            transactions,
            page,
            total,
            per_page: self.page_size,
        })
    }

    async fn address_unspent(&self, address: &str) -> GatewayResult<Vec<Unspent>> {
        let state = self.state();
        Self::check_online(&state)?;
        Ok(state.unspent.get(address).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushBehavior {
    Accept,
    Reject,
    Fail,
}

/// A push endpoint with a fixed answer that records what it was given.
#[derive(Debug, Clone)]
pub struct ScriptedBroadcaster {
    name: String,
    behavior: PushBehavior,
    pushed: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBroadcaster {
    fn with(name: &str, behavior: PushBehavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            pushed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answers HTTP 200.
    pub fn accepting(name: &str) -> Self {
        Self::with(name, PushBehavior::Accept)
    }

    /// Answers with a non-200 status.
    pub fn rejecting(name: &str) -> Self {
        Self::with(name, PushBehavior::Reject)
    }

    /// Fails at the transport level.
    pub fn failing(name: &str) -> Self {
        Self::with(name, PushBehavior::Fail)
    }

    /// Raw transactions received so far.
    pub fn pushed(&self) -> Vec<String> {
        self.pushed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Broadcaster for ScriptedBroadcaster {
    fn name(&self) -> &str {
        &self.name
    }

    async fn push_transaction(&self, raw_hex: &str) -> GatewayResult<bool> {
        self.pushed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(raw_hex.to_string());
        match self.behavior {
            PushBehavior::Accept => Ok(true),
            PushBehavior::Reject => Ok(false),
            PushBehavior::Fail => Err(GatewayError::Http(format!("{} unreachable", self.name))),
        }
    }
}
