//! Payment reconciliation.
//!
//! # Data Flow
//! ```text
//! reconcile(target)
//!     → ledger: read previous watermark
//!     → gateway: current height
//!     → history.rs: pages newest-first down to floor = prev - reorg_window
//!     → classify dust, assign draw ids
//!     → ledger unit of work:
//!         advance watermark prev → new (exactly one row, else Conflict)
//!         delete rows at/above floor and every unconfirmed row
//!         insert the fresh set (one row each)
//!         seed draw rows up to the current draw
//! ```
//!
//! # Design Decisions
//! - Replace, never merge: the window is rebuilt wholesale each pass, which
//!   is how reorgs and provisional draw ids get corrected
//! - All network reads happen before the unit of work starts; a failed read
//!   leaves the ledger untouched and is safe to retry
//! - The watermark never moves backwards, even if a provider lags

pub mod history;

use std::sync::Arc;

use serde::Serialize;

use crate::chain::ChainGateway;
use crate::error::{SettlementError, SettlementResult};
use crate::ledger::queries::payments::{self, NewPayment, PaymentKind};
use crate::ledger::queries::{draws, watermarks};
use crate::ledger::{LedgerError, LedgerStore};
use crate::observability::metrics;
use crate::settlement::schedule::DrawSchedule;

/// An address whose payments are tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackedAddress {
    /// The lottery collection address.
    Pot(String),
    Sponsor { id: u32, address: String },
}

impl TrackedAddress {
    pub fn address(&self) -> &str {
        match self {
            TrackedAddress::Pot(address) => address,
            TrackedAddress::Sponsor { address, .. } => address,
        }
    }

    pub fn kind(&self) -> PaymentKind {
        match self {
            TrackedAddress::Pot(_) => PaymentKind::Lottery,
            TrackedAddress::Sponsor { .. } => PaymentKind::Sponsor,
        }
    }
}

/// What a reconciliation pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub address: String,
    pub previous_watermark: u64,
    pub new_watermark: u64,
    pub floor: u64,
    pub payments: usize,
    pub replaced: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcileParams {
    pub reorg_window: u64,
    pub dust_threshold: u64,
}

#[derive(Clone)]
pub struct Reconciler {
    gateway: Arc<dyn ChainGateway>,
    ledger: LedgerStore,
    schedule: DrawSchedule,
    params: ReconcileParams,
}

impl Reconciler {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        ledger: LedgerStore,
        schedule: DrawSchedule,
        params: ReconcileParams,
    ) -> Self {
        Self {
            gateway,
            ledger,
            schedule,
            params,
        }
    }

    /// Reconcile against the gateway's current height.
    pub async fn reconcile(&self, target: &TrackedAddress) -> SettlementResult<ReconcileReport> {
        let height = self.gateway.height().await?;
        self.reconcile_at(target, height).await
    }

    /// Reconcile treating `current_height` as the new watermark.
    pub async fn reconcile_at(
        &self,
        target: &TrackedAddress,
        current_height: u64,
    ) -> SettlementResult<ReconcileReport> {
        let address = target.address().to_string();
        let kind = target.kind();

        let lookup = address.clone();
        let previous = self
            .ledger
            .read(move |c| watermarks::get(c, &lookup))
            .await?
            .ok_or_else(|| SettlementError::validation(format!("{address} is not a tracked address")))?;

        let floor = previous.saturating_sub(self.params.reorg_window);
        let new_watermark = current_height.max(previous);

        let result = self
            .replace(target, &address, kind, previous, new_watermark, floor)
            .await;

        let owner = kind.as_str();
        match &result {
            Ok(report) => {
                metrics::record_reconciliation(owner, "ok");
                metrics::record_payments(owner, report.payments as u64);
                metrics::set_watermark(&address, new_watermark);
                tracing::info!(
                    address = %address,
                    kind = owner,
                    previous_watermark = previous,
                    new_watermark,
                    floor,
                    payments = report.payments,
                    replaced = report.replaced,
                    "Reconciled payments"
                );
            }
            Err(e) => {
                metrics::record_reconciliation(owner, e.kind().as_str());
                tracing::warn!(address = %address, kind = owner, error = %e, "Reconciliation failed");
            }
        }
        result
    }

    async fn replace(
        &self,
        target: &TrackedAddress,
        address: &str,
        kind: PaymentKind,
        previous: u64,
        new_watermark: u64,
        floor: u64,
    ) -> SettlementResult<ReconcileReport> {
        let observed = history::fetch_payments(self.gateway.as_ref(), address, floor).await?;

        let rows: Vec<NewPayment> = observed
            .into_iter()
            .map(|p| {
                let draw_id = match target {
                    TrackedAddress::Pot(_) => self.schedule.lottery_draw(p.block_height, new_watermark),
                    TrackedAddress::Sponsor { .. } => {
                        self.schedule.sponsor_draw(p.block_height, new_watermark)
                    }
                };
                NewPayment {
                    dust: p.amount < self.params.dust_threshold,
                    txid: p.txid,
                    vout: p.vout,
                    block_height: p.block_height,
                    amount: p.amount,
                    draw_id,
                    sending_address: p.sending_address,
                }
            })
            .collect();

        let count = rows.len();
        let owner = address.to_string();
        let seed_through = self.schedule.current_draw(new_watermark);
        let created = chrono::Utc::now().to_rfc3339();

        let replaced = self
            .ledger
            .write("reconcile", move |tx| {
                watermarks::advance(tx, &owner, previous, new_watermark)?;
                let replaced = payments::replace_window(tx, &owner, kind, floor, &rows, &created)?;
                draws::ensure_through(tx, seed_through)?;
                Ok::<_, LedgerError>(replaced)
            })
            .await?;

        Ok(ReconcileReport {
            address: address.to_string(),
            previous_watermark: previous,
            new_watermark,
            floor,
            payments: count,
            replaced,
        })
    }
}
