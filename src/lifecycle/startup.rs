//! Startup orchestration.
//!
//! [`Services::build`] wires the production gateway and push endpoints;
//! [`Services::assemble`] takes them as arguments so tests and dry runs can
//! hand in in-memory ones.

use std::sync::Arc;

use thiserror::Error;

use crate::chain::{BroadcastPool, ChainGateway, GatewayError, RestChainGateway};
use crate::config::{ConfigError, SettlementConfig};
use crate::forwarding::{SweepEngine, SweepParams};
use crate::http::AppState;
use crate::keys::{parse_address, parse_network, KeyError, KeyService};
use crate::ledger::queries::payments::PaymentKind;
use crate::ledger::queries::watermarks;
use crate::ledger::{LedgerError, LedgerStore};
use crate::reconcile::{ReconcileParams, Reconciler};
use crate::registry::Registry;
use crate::scheduler::Scheduler;
use crate::settlement::{DrawProcessor, DrawSchedule, SettlementEngine, Stretcher};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Keys(#[from] KeyError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("metrics exporter: {0}")]
    Metrics(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Every long-lived component, built once.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<SettlementConfig>,
    pub ledger: LedgerStore,
    pub keys: Arc<KeyService>,
    pub schedule: DrawSchedule,
    pub registry: Registry,
    pub scheduler: Arc<Scheduler>,
}

impl Services {
    /// Open the on-disk ledger and talk to the configured providers.
    pub fn build(config: SettlementConfig) -> Result<Self, StartupError> {
        let ledger = LedgerStore::open(&config.ledger)?;
        let gateway: Arc<dyn ChainGateway> =
            Arc::new(RestChainGateway::new(&config.chain, config.retries.clone())?);
        let broadcaster = BroadcastPool::from_config(&config.broadcast)?;
        Self::assemble(config, ledger, gateway, broadcaster)
    }

    pub fn assemble(
        config: SettlementConfig,
        ledger: LedgerStore,
        gateway: Arc<dyn ChainGateway>,
        broadcaster: BroadcastPool,
    ) -> Result<Self, StartupError> {
        let network = parse_network(&config.chain.network)?;
        let keys = Arc::new(KeyService::from_config(&config.keys, network)?);
        let pot = parse_address(&config.lottery.pot_address, network)?;
        let schedule = DrawSchedule::from_config(&config.lottery);

        let pot_address = pot.to_string();
        let broadcast_endpoints = broadcaster.endpoint_count();
        let starting_block = config.lottery.starting_block;
        let watermark = ledger.write_blocking("seed pot watermark", |tx| {
            watermarks::ensure(tx, &pot_address, PaymentKind::Lottery, starting_block)
        })?;

        let reconciler = Reconciler::new(
            Arc::clone(&gateway),
            ledger.clone(),
            schedule,
            ReconcileParams {
                reorg_window: config.lottery.reorg_window,
                dust_threshold: config.lottery.dust_threshold,
            },
        );
        let processor = DrawProcessor::new(
            Arc::clone(&gateway),
            ledger.clone(),
            reconciler.clone(),
            SettlementEngine::new(ledger.clone(), schedule),
            Stretcher::from_config(&config.stretch),
            pot_address.clone(),
        );
        let sweeper = SweepEngine::new(
            gateway,
            Arc::new(broadcaster),
            Arc::clone(&keys),
            ledger.clone(),
            pot,
            SweepParams::from_config(&config.forwarding, &config.lottery),
        );
        let scheduler = Arc::new(Scheduler::new(
            processor,
            reconciler,
            sweeper,
            ledger.clone(),
            config.scheduler.clone(),
            config.forwarding.batch_limit,
        ));
        let registry = Registry::new(
            ledger.clone(),
            Arc::clone(&keys),
            config.forwarding.base_check_interval_secs as i64,
        );

        tracing::info!(
            network = %network,
            pot = %pot_address,
            watermark,
            starting_block,
            broadcast_endpoints,
            blocks_per_draw = config.lottery.blocks_per_draw,
            stretch_iterations = config.stretch.iterations,
            "Services assembled"
        );

        Ok(Self {
            config: Arc::new(config),
            ledger,
            keys,
            schedule,
            registry,
            scheduler,
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            scheduler: Arc::clone(&self.scheduler),
            registry: self.registry.clone(),
            ledger: self.ledger.clone(),
            schedule: self.schedule,
            pot_address: self.scheduler.processor().pot().address().to_string(),
            network: self.keys.network(),
            admin_api_key: Arc::from(self.config.admin.api_key.as_str()),
        }
    }
}
