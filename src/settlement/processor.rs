//! Block-driven draw processing.
//!
//! On each new block: reconcile the pot, then finalize every draw whose
//! seeding block is mined, oldest first.

use std::sync::Arc;

use serde::Serialize;

use crate::chain::{ChainGateway, GatewayError};
use crate::error::{SettlementError, SettlementResult};
use crate::ledger::queries::{draws, watermarks};
use crate::ledger::LedgerStore;
use crate::reconcile::{ReconcileReport, Reconciler, TrackedAddress};
use crate::settlement::engine::{FinalizeOutcome, SettlementEngine};
use crate::settlement::stretch::{normalize_hash, Stretcher};

#[derive(Debug, Clone, Serialize)]
pub struct BlockReport {
    pub height: u64,
    pub reconcile: ReconcileReport,
    pub finalized: Vec<FinalizeOutcome>,
}

#[derive(Clone)]
pub struct DrawProcessor {
    gateway: Arc<dyn ChainGateway>,
    ledger: LedgerStore,
    reconciler: Reconciler,
    engine: SettlementEngine,
    stretcher: Stretcher,
    pot: TrackedAddress,
}

impl DrawProcessor {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        ledger: LedgerStore,
        reconciler: Reconciler,
        engine: SettlementEngine,
        stretcher: Stretcher,
        pot_address: String,
    ) -> Self {
        Self {
            gateway,
            ledger,
            reconciler,
            engine,
            stretcher,
            pot: TrackedAddress::Pot(pot_address),
        }
    }

    pub fn pot(&self) -> &TrackedAddress {
        &self.pot
    }

    pub fn engine(&self) -> &SettlementEngine {
        &self.engine
    }

    pub fn stretcher(&self) -> &Stretcher {
        &self.stretcher
    }

    /// Reconcile the pot at `height` (or the gateway tip) and finalize
    /// every draw that has become finalizable.
    pub async fn process_block(&self, height: Option<u64>) -> SettlementResult<BlockReport> {
        let height = match height {
            Some(h) => h,
            None => self.gateway.height().await?,
        };

        let reconcile = self.reconciler.reconcile_at(&self.pot, height).await?;
        let schedule = *self.engine.schedule();

        let last_finalized = self.ledger.read(draws::last_finalized).await?;
        let open_draw = schedule.draw_id(height + 1);

        let mut finalized = Vec::new();
        for draw_id in (last_finalized + 1)..open_draw {
            let hash_height = schedule.hash_height(draw_id);
            if hash_height > reconcile.new_watermark {
                tracing::debug!(draw_id, hash_height, height, "Seeding block not reached yet");
                break;
            }

            let block_hash = match self.gateway.hash_at_height(hash_height).await {
                Ok(hash) => hash,
                Err(GatewayError::NotMined(_)) => {
                    tracing::info!(draw_id, hash_height, "Seeding block not mined yet");
                    break;
                }
                Err(e) => return Err(e.into()),
            };

            match self.stretch_and_finalize(draw_id, &block_hash).await {
                Ok(outcome) => finalized.push(outcome),
                Err(SettlementError::AlreadyFinalized { .. }) => {
                    tracing::info!(draw_id, "Draw finalized by another job");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(BlockReport {
            height,
            reconcile,
            finalized,
        })
    }

    /// Finalize one draw whose seeding block the pot scan has reached.
    pub async fn finalize_one(&self, draw_id: u64) -> SettlementResult<FinalizeOutcome> {
        let schedule = *self.engine.schedule();
        let hash_height = schedule.hash_height(draw_id);
        let pot = self.pot.address().to_string();
        let watermark = self
            .ledger
            .read(move |c| watermarks::get(c, &pot))
            .await?
            .unwrap_or(0);
        if hash_height > watermark {
            return Err(SettlementError::Conflict(format!(
                "draw {draw_id} is seeded by block {hash_height}, pot scanned to {watermark}"
            )));
        }

        let block_hash = self.gateway.hash_at_height(hash_height).await?;
        self.stretch_and_finalize(draw_id, &block_hash).await
    }

    async fn stretch_and_finalize(&self, draw_id: u64, block_hash: &str) -> SettlementResult<FinalizeOutcome> {
        let block_hash = normalize_hash("block_hash", block_hash)?;
        let stretched = self.stretcher.stretch(&block_hash).await?;
        self.engine.finalize_draw(draw_id, &block_hash, &stretched).await
    }

    /// Record the payout transaction of a finalized draw (FINALIZED → PAID).
    pub async fn record_winner_txid(&self, draw_id: u64, txid: &str) -> SettlementResult<()> {
        let txid = normalize_hash("txid", txid)?;
        let stored = txid.clone();
        self.ledger
            .write("record_winner_txid", move |tx| draws::set_winner_txid(tx, draw_id, &stored))
            .await?;
        tracing::info!(draw_id, txid = %txid, "Winner payout recorded");
        Ok(())
    }
}
