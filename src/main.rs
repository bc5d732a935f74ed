//! pevpot settlement daemon.
//!
//! ```text
//!   provider hooks ──▶ http ──┐
//!                             ▼
//!   block/forwarding ──▶ scheduler ──▶ reconcile ──▶ ledger ◀── settlement
//!   tickers                   │                        ▲
//!                             └──▶ forwarding ──▶ chain (unspent, push)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use pevpot::config::load_config;
use pevpot::http::HttpServer;
use pevpot::lifecycle::{signals, Services, Shutdown, StartupError};
use pevpot::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "pevpot", version, about = "Provably fair lottery settlement daemon")]
struct Args {
    /// Configuration file.
    #[arg(short, long, default_value = "pevpot.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let args = Args::parse();
    let config = load_config(&args.config)?;
    logging::init(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        bind_address = %config.admin.bind_address,
        ledger = %config.ledger.path,
        "pevpot starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr).map_err(|e| StartupError::Metrics(e.to_string()))?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let bind_address = config.admin.bind_address.clone();
    let admin = config.admin.clone();
    let services = Services::build(config)?;

    let shutdown = Shutdown::new();
    let scheduler = tokio::spawn(services.scheduler.clone().run(shutdown.subscribe()));
    let listener = TcpListener::bind(&bind_address).await?;
    let server = HttpServer::new(services.app_state(), &admin);
    let http = server.run(listener, shutdown.subscribe());

    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));
    http.await?;

    if let Err(e) = scheduler.await {
        tracing::error!(error = %e, "Scheduler task ended abnormally");
    }
    tracing::info!("pevpot stopped");
    Ok(())
}
