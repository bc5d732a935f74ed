//! Background jobs and their coordination.
//!
//! # Data Flow
//! ```text
//! block ticker ──────▶ process_block (pot + draws) ─▶ reconcile_sponsors
//! forwarding ticker ─▶ due_forwarding ─▶ sweep (one job per address)
//! HTTP hooks/admin ──▶ JobQueue (one run + one rerun per key) ──▶ the same job methods
//!
//! every job: EntityLocks::acquire(keys) → optional timeout → metrics
//! ```
//!
//! # Design Decisions
//! - The scheduler owns its state and is handed to whoever triggers jobs;
//!   there are no process-wide "already running" flags
//! - Jobs on the same entity queue on its lock; different entities run
//!   concurrently
//! - Externally triggered jobs are coalesced per key before they reach the
//!   locks, so a burst of notifications costs at most one extra run
//! - Draw jobs carry no deadline since stretching is slow by construction.
//!   Ledger units run on the blocking pool, so a timed-out job never leaves
//!   a half-applied window behind

pub mod coalesce;
pub mod locks;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::SchedulerConfig;
use crate::error::{SettlementError, SettlementResult};
use crate::forwarding::{SweepEngine, SweepOutcome};
use crate::ledger::queries::sponsors::{self, SponsorRow};
use crate::ledger::queries::addresses;
use crate::ledger::LedgerStore;
use crate::observability::metrics;
use crate::reconcile::{ReconcileReport, Reconciler, TrackedAddress};
use crate::settlement::{BlockReport, DrawProcessor, FinalizeOutcome};

pub use coalesce::{JobQueue, Submission};
pub use locks::{EntityKey, EntityLocks, HeldLocks};

/// Sweeps running at once within one forwarding poll.
const SWEEP_CONCURRENCY: usize = 4;

pub struct Scheduler {
    locks: EntityLocks,
    jobs: JobQueue,
    processor: DrawProcessor,
    reconciler: Reconciler,
    sweeper: SweepEngine,
    ledger: LedgerStore,
    config: SchedulerConfig,
    batch_limit: u32,
}

impl Scheduler {
    pub fn new(
        processor: DrawProcessor,
        reconciler: Reconciler,
        sweeper: SweepEngine,
        ledger: LedgerStore,
        config: SchedulerConfig,
        batch_limit: u32,
    ) -> Self {
        Self {
            locks: EntityLocks::new(),
            jobs: JobQueue::new(),
            processor,
            reconciler,
            sweeper,
            ledger,
            config,
            batch_limit,
        }
    }

    pub fn locks(&self) -> &EntityLocks {
        &self.locks
    }

    /// Coalescing queue for jobs triggered by hooks and admin requests.
    pub fn jobs(&self) -> &JobQueue {
        &self.jobs
    }

    pub fn processor(&self) -> &DrawProcessor {
        &self.processor
    }

    fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.config.job_timeout_secs)
    }

    async fn run_job<T, F>(
        &self,
        job: &'static str,
        keys: Vec<EntityKey>,
        deadline: Option<Duration>,
        work: F,
    ) -> SettlementResult<T>
    where
        F: Future<Output = SettlementResult<T>>,
    {
        let _held = self.locks.acquire(keys).await;
        let result = match deadline {
            Some(limit) => match time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => Err(SettlementError::Timeout(limit.as_secs())),
            },
            None => work.await,
        };
        metrics::record_job(job, result.is_ok());
        if let Err(e) = &result {
            tracing::warn!(
                job,
                error = %e,
                kind = e.kind().as_str(),
                retryable = e.kind().is_retryable(),
                "Job failed"
            );
        }
        result
    }

    /// Reconcile the pot and finalize whatever became finalizable.
    pub async fn process_block(&self, height: Option<u64>) -> SettlementResult<BlockReport> {
        let keys = vec![EntityKey::Address(self.processor.pot().address().to_string()), EntityKey::Draws];
        self.run_job("process_block", keys, None, self.processor.process_block(height))
            .await
    }

    /// Reconcile the pot without touching draws.
    pub async fn reconcile_pot(&self) -> SettlementResult<ReconcileReport> {
        let pot = self.processor.pot().clone();
        let keys = vec![EntityKey::Address(pot.address().to_string())];
        self.run_job("reconcile_pot", keys, Some(self.job_timeout()), async {
            self.reconciler.reconcile(&pot).await
        })
        .await
    }

    pub async fn finalize_draw(&self, draw_id: u64) -> SettlementResult<FinalizeOutcome> {
        self.run_job("finalize_draw", vec![EntityKey::Draws], None, self.processor.finalize_one(draw_id))
            .await
    }

    pub async fn record_winner_txid(&self, draw_id: u64, txid: &str) -> SettlementResult<()> {
        self.run_job(
            "record_winner_txid",
            vec![EntityKey::Draws],
            Some(self.job_timeout()),
            self.processor.record_winner_txid(draw_id, txid),
        )
        .await
    }

    pub async fn reconcile_sponsor(&self, sponsor: &SponsorRow) -> SettlementResult<ReconcileReport> {
        let target = TrackedAddress::Sponsor {
            id: sponsor.id,
            address: sponsor.bitcoin_address.clone(),
        };
        let keys = vec![EntityKey::Address(sponsor.bitcoin_address.clone())];
        self.run_job("reconcile_sponsor", keys, Some(self.job_timeout()), async {
            self.reconciler.reconcile(&target).await
        })
        .await
    }

    /// Reconcile the sponsor owning `address`.
    pub async fn reconcile_sponsor_address(&self, address: &str) -> SettlementResult<ReconcileReport> {
        let lookup = address.to_string();
        let sponsor = self
            .ledger
            .read(move |c| sponsors::get_by_address(c, &lookup))
            .await?
            .ok_or_else(|| SettlementError::validation(format!("{address} is not a sponsor address")))?;
        self.reconcile_sponsor(&sponsor).await
    }

    /// Reconcile every sponsor concurrently; one failure does not stop the rest.
    pub async fn reconcile_sponsors(&self) -> SettlementResult<Vec<SettlementResult<ReconcileReport>>> {
        let all = self.ledger.read(sponsors::list).await?;
        Ok(join_all(all.iter().map(|s| self.reconcile_sponsor(s))).await)
    }

    pub async fn sweep(&self, index: u32) -> SettlementResult<SweepOutcome> {
        let now = chrono::Utc::now().timestamp();
        self.run_job(
            "sweep",
            vec![EntityKey::Forwarding(index)],
            Some(self.job_timeout()),
            self.sweeper.sweep_and_reschedule(index, now),
        )
        .await
    }

    /// Sweep the forwarding addresses that are due, earliest first.
    pub async fn sweep_due(&self) -> SettlementResult<Vec<SettlementResult<SweepOutcome>>> {
        let now = chrono::Utc::now().timestamp();
        let limit = self.batch_limit;
        let due = self
            .ledger
            .read(move |c| addresses::due_forwarding(c, now, limit))
            .await?;
        if !due.is_empty() {
            tracing::info!(due = due.len(), "Sweeping due forwarding addresses");
        }
        Ok(stream::iter(due)
            .map(|index| self.sweep(index))
            .buffer_unordered(SWEEP_CONCURRENCY)
            .collect::<Vec<_>>()
            .await)
    }

    async fn block_tick(&self) {
        match self.process_block(None).await {
            Ok(report) => tracing::debug!(
                height = report.height,
                finalized = report.finalized.len(),
                "Block poll complete"
            ),
            Err(e) => tracing::error!(error = %e, "Block poll failed"),
        }
        if let Err(e) = self.reconcile_sponsors().await {
            tracing::error!(error = %e, "Listing sponsors failed");
        }
    }

    async fn forwarding_tick(&self) {
        match self.sweep_due().await {
            Ok(results) => {
                let forwarded = results
                    .iter()
                    .filter(|r| matches!(r, Ok(o) if o.forwarded))
                    .count();
                tracing::debug!(checked = results.len(), forwarded, "Forwarding poll complete");
            }
            Err(e) => tracing::error!(error = %e, "Forwarding poll failed"),
        }
    }

    /// Poll loops until shutdown. A running job finishes before the loop exits.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Scheduler disabled");
            return;
        }

        tracing::info!(
            block_poll_secs = self.config.block_poll_secs,
            forwarding_poll_secs = self.config.forwarding_poll_secs,
            job_timeout_secs = self.config.job_timeout_secs,
            "Scheduler starting"
        );

        let mut blocks = time::interval(Duration::from_secs(self.config.block_poll_secs.max(1)));
        blocks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut forwarding = time::interval(Duration::from_secs(self.config.forwarding_poll_secs.max(1)));
        forwarding.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = blocks.tick() => self.block_tick().await,
                _ = forwarding.tick() => self.forwarding_tick().await,
                _ = shutdown.recv() => {
                    tracing::info!("Scheduler received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
