//! Forwarding sweeps and their check schedule.

use std::sync::Arc;

use bitcoin::Address;
use serde::Serialize;

use crate::chain::{BroadcastPool, ChainGateway};
use crate::config::{ForwardingConfig, LotteryConfig};
use crate::error::{SettlementError, SettlementResult};
use crate::forwarding::builder::{build_sweep, SignedSweep};
use crate::forwarding::fee::fee_for_size;
use crate::keys::KeyService;
use crate::ledger::queries::addresses::{self, ScheduleUpdate};
use crate::ledger::LedgerStore;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepParams {
    pub fee_per_kb: u64,
    pub dust_threshold: u64,
    pub base_interval_secs: i64,
    pub multiplier: i64,
}

impl SweepParams {
    pub fn from_config(forwarding: &ForwardingConfig, lottery: &LotteryConfig) -> Self {
        Self {
            fee_per_kb: forwarding.fee_per_kb,
            dust_threshold: lottery.dust_threshold,
            base_interval_secs: forwarding.base_check_interval_secs as i64,
            multiplier: forwarding.backoff_multiplier as i64,
        }
    }
}

/// Result of one sweep attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepOutcome {
    pub forwarding_index: u32,
    pub address: String,
    pub forwarded: bool,
    pub txid: Option<String>,
    pub amount: Option<u64>,
    pub fee: Option<u64>,
    pub accepted_by: Option<String>,
}

#[derive(Clone)]
pub struct SweepEngine {
    gateway: Arc<dyn ChainGateway>,
    broadcaster: Arc<BroadcastPool>,
    keys: Arc<KeyService>,
    ledger: LedgerStore,
    pot: Address,
    params: SweepParams,
}

impl SweepEngine {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        broadcaster: Arc<BroadcastPool>,
        keys: Arc<KeyService>,
        ledger: LedgerStore,
        pot: Address,
        params: SweepParams,
    ) -> Self {
        Self {
            gateway,
            broadcaster,
            keys,
            ledger,
            pot,
            params,
        }
    }

    pub fn params(&self) -> &SweepParams {
        &self.params
    }

    /// Forward everything held by forwarding address `index` to the pot.
    ///
    /// `forwarded: false` is a normal outcome. A broadcast rejected by
    /// every endpoint is `BroadcastFailed`.
    pub async fn sweep(&self, index: u32) -> SettlementResult<SweepOutcome> {
        let registration = self
            .ledger
            .read(move |c| addresses::get_by_forwarding_index(c, index))
            .await?
            .ok_or_else(|| SettlementError::validation(format!("unknown forwarding index {index}")))?;

        let key = self.keys.derive_forwarding_key(index)?;
        let address = key.address.to_string();
        if address != registration.bitcoin_address {
            return Err(SettlementError::Invariant(format!(
                "forwarding index {index} derives {address}, ledger holds {}",
                registration.bitcoin_address
            )));
        }

        let unspent = self.gateway.address_unspent(&address).await?;
        let secp = self.keys.secp();
        let dust = self.params.dust_threshold;

        let mut outcome = SweepOutcome {
            forwarding_index: index,
            address: address.clone(),
            forwarded: false,
            txid: None,
            amount: None,
            fee: None,
            accepted_by: None,
        };

        // Sign once at zero fee to learn the size, then again with the real fee.
        let Some(draft) = build_sweep(secp, &key, &unspent, &self.pot, 0, dust)? else {
            tracing::debug!(forwarding_index = index, %address, inputs = unspent.len(), "Nothing to forward");
            metrics::record_sweep("nothing");
            return Ok(outcome);
        };
        let fee = fee_for_size(self.params.fee_per_kb, draft.size);
        let Some(sweep) = build_sweep(secp, &key, &unspent, &self.pot, fee, dust)? else {
            tracing::info!(forwarding_index = index, %address, total = draft.total_input, fee, "Balance does not cover the fee");
            metrics::record_sweep("nothing");
            return Ok(outcome);
        };

        let accepted_by = self.push(&sweep).await?;
        tracing::info!(
            forwarding_index = index,
            %address,
            txid = %sweep.txid,
            inputs = unspent.len(),
            amount = sweep.output,
            fee,
            "Forwarded deposit to pot"
        );
        metrics::record_sweep("forwarded");

        outcome.forwarded = true;
        outcome.txid = Some(sweep.txid);
        outcome.amount = Some(sweep.output);
        outcome.fee = Some(fee);
        outcome.accepted_by = Some(accepted_by);
        Ok(outcome)
    }

    async fn push(&self, sweep: &SignedSweep) -> SettlementResult<String> {
        self.broadcaster
            .broadcast(&sweep.txid, &sweep.raw_hex)
            .await
            .map_err(|e| {
                metrics::record_sweep("broadcast_failed");
                SettlementError::BroadcastFailed {
                    txid: sweep.txid.clone(),
                    reason: e.to_string(),
                }
            })
    }

    /// Sweep, then record the check. Any failure leaves the schedule as it
    /// was so the address stays due.
    pub async fn sweep_and_reschedule(&self, index: u32, now: i64) -> SettlementResult<SweepOutcome> {
        let outcome = match self.sweep(index).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(forwarding_index = index, error = %e, kind = e.kind().as_str(), "Sweep failed, schedule unchanged");
                return Err(e);
            }
        };

        let update = ScheduleUpdate {
            forwarded: outcome.forwarded,
            now,
            base_interval_secs: self.params.base_interval_secs,
            multiplier: self.params.multiplier,
        };
        self.ledger
            .write("forwarding schedule", move |tx| addresses::update_schedule(tx, index, update))
            .await?;
        Ok(outcome)
    }
}
