//! REST chain data provider.
//!
//! # Responsibilities
//! - Query height, block hash, address history and unspent outputs
//! - Attach the API key to every request
//! - Enforce a per-request deadline and retry transient failures

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::time::timeout;

use crate::chain::types::{ChainTx, GatewayError, GatewayResult, HistoryPage, TxInput, TxOutput, Unspent};
use crate::chain::ChainGateway;
use crate::config::{ChainConfig, RetryConfig};
use crate::observability::metrics;
use crate::resilience::retries::retry_transient;

/// Blocktrail-shaped REST gateway.
#[derive(Clone)]
pub struct RestChainGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    page_size: u32,
    timeout_secs: u64,
    retry: RetryConfig,
}

impl RestChainGateway {
    pub fn new(config: &ChainConfig, retry: RetryConfig) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("pevpot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        tracing::info!(
            api_url = %config.api_url,
            page_size = config.page_size,
            "Chain gateway initialized"
        );

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            page_size: config.page_size,
            timeout_secs: config.request_timeout_secs,
            retry,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// GET `path` and decode JSON, mapping 404 to `None`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        op: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> GatewayResult<Option<T>> {
        let result = retry_transient(&self.retry, op, GatewayError::is_transient, || {
            self.get_json_once(path, query)
        })
        .await;

        metrics::record_gateway_request(op, result.is_ok());
        result
    }

    async fn get_json_once<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> GatewayResult<Option<T>> {
        let request = self
            .http
            .get(self.url(path))
            .query(query)
            .query(&[("api_key", self.api_key.as_str())]);

        tracing::debug!(path, "Requesting chain data");

        let deadline = Duration::from_secs(self.timeout_secs);
        let response = match timeout(deadline, request.send()).await {
            Ok(result) => result?,
            Err(_) => return Err(GatewayError::Timeout(self.timeout_secs)),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_server_error() {
            return Err(GatewayError::Http(format!("status {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        match timeout(deadline, response.json::<T>()).await {
            Ok(result) => Ok(Some(result?)),
            Err(_) => Err(GatewayError::Timeout(self.timeout_secs)),
        }
    }

    async fn unspent_page(&self, address: &str, page: u32) -> GatewayResult<ProviderPage<ProviderUtxo>> {
        let path = format!("address/{}/unspent-outputs", address);
        let query = [("page", page.to_string()), ("limit", self.page_size.to_string())];
        self.get_json("address_unspent", &path, &query)
            .await?
            .ok_or_else(|| GatewayError::Malformed(format!("unknown address {}", address)))
    }
}

#[async_trait]
impl ChainGateway for RestChainGateway {
    async fn height(&self) -> GatewayResult<u64> {
        let block: ProviderBlock = self
            .get_json("height", "block/latest", &[])
            .await?
            .ok_or_else(|| GatewayError::Malformed("latest block missing".to_string()))?;
        Ok(block.height)
    }

    async fn hash_at_height(&self, height: u64) -> GatewayResult<String> {
        let block: ProviderBlock = self
            .get_json("hash_at_height", &format!("block/{}", height), &[])
            .await?
            .ok_or(GatewayError::NotMined(height))?;

        if block.height != height {
            return Err(GatewayError::Malformed(format!(
                "asked for block {}, provider returned {}",
                height, block.height
            )));
        }
        Ok(block.hash)
    }

    async fn address_history_page(&self, address: &str, page: u32) -> GatewayResult<HistoryPage> {
        let path = format!("address/{}/transactions", address);
        let query = [
            ("page", page.to_string()),
            ("limit", self.page_size.to_string()),
            ("sort_dir", "desc".to_string()),
        ];

        let body: Option<ProviderPage<ProviderTx>> =
            self.get_json("address_history", &path, &query).await?;

        match body {
            Some(body) => history_from_provider(body, page),
            // Addresses the provider has never seen have no history.
            None => Ok(HistoryPage {
                transactions: Vec::new(),
                page,
                total: 0,
                per_page: self.page_size,
            }),
        }
    }

    async fn address_unspent(&self, address: &str) -> GatewayResult<Vec<Unspent>> {
        let mut unspent = Vec::new();
        let mut page = 1;

        loop {
            let body = self.unspent_page(address, page).await?;
            check_page(body.current_page, page)?;
            let pages = page_count(body.total, body.per_page);

            unspent.extend(body.data.into_iter().map(|o| Unspent {
                txid: o.hash,
                vout: o.index,
                amount: o.value,
            }));

            if page >= pages {
                break;
            }
            page += 1;
        }

        Ok(unspent)
    }
}

#[derive(Debug, Deserialize)]
struct ProviderBlock {
    height: u64,
    hash: String,
}

#[derive(Debug, Deserialize)]
struct ProviderPage<T> {
    data: Vec<T>,
    current_page: u32,
    per_page: u32,
    total: u64,
}

#[derive(Debug, Deserialize)]
struct ProviderTx {
    hash: String,
    block_height: Option<u64>,
    #[serde(default)]
    inputs: Vec<ProviderInput>,
    #[serde(default)]
    outputs: Vec<ProviderOutput>,
}

#[derive(Debug, Deserialize)]
struct ProviderInput {
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderOutput {
    address: Option<String>,
    index: u32,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct ProviderUtxo {
    hash: String,
    index: u32,
    value: u64,
}

fn page_count(total: u64, per_page: u32) -> u32 {
    if per_page == 0 {
        return 0;
    }
    total.div_ceil(per_page as u64) as u32
}

fn check_page(returned: u32, requested: u32) -> GatewayResult<()> {
    if returned != requested {
        return Err(GatewayError::Malformed(format!(
            "asked for page {}, provider returned {}",
            requested, returned
        )));
    }
    Ok(())
}

fn history_from_provider(body: ProviderPage<ProviderTx>, requested: u32) -> GatewayResult<HistoryPage> {
    check_page(body.current_page, requested)?;

    let transactions = body
        .data
        .into_iter()
        .map(|tx| ChainTx {
            txid: tx.hash,
            inputs: tx
                .inputs
                .into_iter()
                .map(|i| TxInput { address: i.address })
                .collect(),
            outputs: tx
                .outputs
                .into_iter()
                .map(|o| TxOutput {
                    address: o.address,
                    index: o.index,
                    amount: o.value,
                })
                .collect(),
            block_height: tx.block_height,
        })
        .collect();

    Ok(HistoryPage {
        transactions,
        page: body.current_page,
        total: body.total,
        per_page: body.per_page,
    })
}
