use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

use pevpot::config::StretchConfig;
use pevpot::observability::logging;
use pevpot::settlement::{verify_report, DrawReport, Stretcher};

#[derive(Parser)]
#[command(name = "pevpot-cli")]
#[command(about = "Operator CLI for the pevpot settlement daemon", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:3000")]
    url: String,

    /// Admin API key (falls back to PEVPOT_ADMIN_API_KEY).
    #[arg(short, long, env = "PEVPOT_ADMIN_API_KEY", default_value = "")]
    key: String,

    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Daemon status
    Status,
    /// Print the public report of a draw
    Draw { id: u64 },
    /// Stretch a block hash locally
    Stretch {
        hash: String,
        #[arg(long, default_value_t = StretchConfig::default().salt)]
        salt: String,
        #[arg(long, default_value_t = StretchConfig::default().iterations)]
        iterations: u64,
    },
    /// Recompute a finalized draw from its public report
    Verify {
        /// Draw id to fetch from the daemon
        #[arg(long, conflicts_with = "file")]
        draw: Option<u64>,
        /// Report JSON saved earlier
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long, default_value_t = StretchConfig::default().salt)]
        salt: String,
        #[arg(long, default_value_t = StretchConfig::default().iterations)]
        iterations: u64,
    },
    /// Ask the daemon to finalize a draw
    Finalize { id: u64 },
    /// Record the payout transaction of a finalized draw
    WinnerTxid { id: u64, txid: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_cli(cli.verbose);
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if !cli.key.is_empty() {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", cli.key))?);
    }

    match cli.command {
        Commands::Status => {
            let res = client
                .get(format!("{}/admin/status", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Draw { id } => {
            let res = client.get(format!("{}/draws/{}", cli.url, id)).send().await?;
            print_response(res).await?;
        }
        Commands::Stretch { hash, salt, iterations } => {
            let stretcher = Stretcher::new(salt, iterations);
            let stretched = stretcher.stretch(&hash).await?;
            println!("{stretched}");
        }
        Commands::Verify {
            draw,
            file,
            salt,
            iterations,
        } => {
            let report: DrawReport = match (draw, file) {
                (_, Some(path)) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
                (Some(id), None) => {
                    let res = client.get(format!("{}/draws/{}", cli.url, id)).send().await?;
                    if !res.status().is_success() {
                        return Err(format!("daemon returned {}", res.status()).into());
                    }
                    res.json().await?
                }
                (None, None) => return Err("pass --draw or --file".into()),
            };

            let stretcher = Stretcher::new(salt, iterations);
            let verification = tokio::task::spawn_blocking(move || verify_report(&report, &stretcher)).await??;
            println!("{}", serde_json::to_string_pretty(&verification)?);
            if !verification.is_valid() {
                eprintln!("Draw does NOT verify");
                std::process::exit(1);
            }
        }
        Commands::Finalize { id } => {
            let res = client
                .post(format!("{}/admin/draws/{}/finalize", cli.url, id))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::WinnerTxid { id, txid } => {
            let res = client
                .post(format!("{}/admin/draws/{}/winner-txid", cli.url, id))
                .headers(headers)
                .json(&json!({ "txid": txid }))
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: daemon returned status {}", status);
        eprintln!("{}", text);
        std::process::exit(1);
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
