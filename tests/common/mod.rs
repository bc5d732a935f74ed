//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bitcoin::bip32::{Xpriv, Xpub};
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::{Network, PrivateKey};
use pevpot::chain::{BroadcastPool, Broadcaster, ChainGateway, ChainTx, InMemoryChain, ScriptedBroadcaster, TxInput, TxOutput};
use pevpot::config::KeyConfig;
use pevpot::ledger::LedgerStore;
use pevpot::{Services, SettlementConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Collection address used by every suite.
pub const POT: &str = "1BoatSLRHtKNngkdXEeobR76b53LETtpyT";

/// Payout address for forwarding registrations.
pub const WIN: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

pub const ADMIN_KEY: &str = "admin-secret";

/// Block hashes for the seeding heights of draws 1 and 2.
pub const HASH_112: &str = "00000000000000000ef86b27c174df6a412c0ce43eab1d532034555749294137";
pub const HASH_122: &str = "000000000000000004a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f607";

/// Root keys from fixed seeds, rendered the way an operator would configure them.
pub fn key_config() -> KeyConfig {
    let secp = Secp256k1::new();
    let forwarding = Xpriv::new_master(Network::Bitcoin, &[0x42; 32]).unwrap();
    let sponsor_root = Xpriv::new_master(Network::Bitcoin, &[0x24; 32]).unwrap();
    let attestation = PrivateKey::new(SecretKey::from_slice(&[0x07; 32]).unwrap(), Network::Bitcoin);

    KeyConfig {
        sponsor_xpub: Xpub::from_priv(&secp, &sponsor_root).to_string(),
        forwarding_xprv: forwarding.to_string(),
        attestation_wif: attestation.to_wif(),
    }
}

/// Ten-block draws starting after height 100, seeded two blocks after each
/// draw ends, with a cheap stretch.
pub fn test_config() -> SettlementConfig {
    let mut config = SettlementConfig::default();
    config.chain.network = "bitcoin".to_string();
    config.lottery.pot_address = POT.to_string();
    config.lottery.starting_block = 100;
    config.lottery.blocks_per_draw = 10;
    config.lottery.hash_confirmation_offset = 2;
    config.lottery.reorg_window = 2;
    config.lottery.dust_threshold = 10_000;
    config.stretch.iterations = 2;
    config.forwarding.fee_per_kb = 10_000;
    config.forwarding.base_check_interval_secs = 600;
    config.forwarding.backoff_multiplier = 3;
    config.forwarding.batch_limit = 10;
    config.retries.enabled = false;
    config.scheduler.enabled = false;
    config.scheduler.job_timeout_secs = 30;
    config.admin.api_key = ADMIN_KEY.to_string();
    config.keys = key_config();
    config
}

/// Services over an in-memory chain and ledger.
pub struct Harness {
    pub chain: InMemoryChain,
    pub services: Services,
    pub pushes: Vec<ScriptedBroadcaster>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_broadcasters(vec![ScriptedBroadcaster::accepting("primary")])
    }

    pub fn with_broadcasters(pushes: Vec<ScriptedBroadcaster>) -> Self {
        let chain = InMemoryChain::new(3);
        let gateway: Arc<dyn ChainGateway> = Arc::new(chain.clone());
        let endpoints = pushes
            .iter()
            .map(|p| Arc::new(p.clone()) as Arc<dyn Broadcaster>)
            .collect();
        let services = Services::assemble(
            test_config(),
            LedgerStore::open_memory().unwrap(),
            gateway,
            BroadcastPool::new(endpoints, 5),
        )
        .unwrap();
        Self {
            chain,
            services,
            pushes,
        }
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.services.ledger
    }
}

/// Deterministic 64-hex txid.
pub fn txid(n: u64) -> String {
    format!("{:064x}", n)
}

/// A payment of `amount` from `sender` to `to`.
pub fn pay(n: u64, to: &str, amount: u64, height: Option<u64>, sender: &str) -> ChainTx {
    ChainTx {
        txid: txid(n),
        inputs: vec![TxInput {
            address: Some(sender.to_string()),
        }],
        outputs: vec![TxOutput {
            address: Some(to.to_string()),
            index: 0,
            amount,
        }],
        block_height: height,
    }
}

/// A request received by a mock backend.
#[derive(Debug, Clone)]
pub struct Received {
    pub request_line: String,
    pub body: String,
}

impl Received {
    pub fn path(&self) -> &str {
        self.request_line.split(' ').nth(1).unwrap_or("")
    }
}

/// Start a programmable mock backend on an ephemeral port. The handler sees
/// each request and answers with a status and body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(Received) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let Some(received) = read_request(&mut socket).await else {
                            return;
                        };
                        let (status, body) = f(received).await;
                        let status_text = match status {
                            200 => "200 OK",
                            400 => "400 Bad Request",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<Received> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Some(Received {
        request_line: head.lines().next().unwrap_or("").to_string(),
        body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
    })
}
