//! Transaction push endpoints and the redundant broadcast pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use crate::chain::types::{GatewayError, GatewayResult};
use crate::chain::Broadcaster;
use crate::config::{BroadcastConfig, PushEncoding, PushEndpointConfig};
use crate::observability::metrics;
use crate::resilience::fanout::first_success;

/// An HTTP push endpoint that accepts a raw transaction as JSON or a form field.
#[derive(Clone)]
pub struct PushEndpoint {
    http: reqwest::Client,
    config: PushEndpointConfig,
}

impl PushEndpoint {
    pub fn new(config: PushEndpointConfig, timeout_secs: u64) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GatewayError::Http(e.to_string()))?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl Broadcaster for PushEndpoint {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn push_transaction(&self, raw_hex: &str) -> GatewayResult<bool> {
        let request = self.http.post(&self.config.url);
        let request = match self.config.encoding {
            PushEncoding::Json => {
                let mut body = serde_json::Map::new();
                body.insert(self.config.field.clone(), serde_json::Value::from(raw_hex));
                request.json(&body)
            }
            PushEncoding::Form => request.form(&[(self.config.field.as_str(), raw_hex)]),
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(endpoint = %self.config.name, status = %status, body = %body, "Push response");

        Ok(status == reqwest::StatusCode::OK)
    }
}

/// Fans a transaction out to every endpoint; success when any accepts.
#[derive(Clone)]
pub struct BroadcastPool {
    endpoints: Vec<Arc<dyn Broadcaster>>,
    timeout_secs: u64,
}

impl BroadcastPool {
    pub fn new(endpoints: Vec<Arc<dyn Broadcaster>>, timeout_secs: u64) -> Self {
        Self {
            endpoints,
            timeout_secs,
        }
    }

    /// Build HTTP endpoints from configuration.
    pub fn from_config(config: &BroadcastConfig) -> GatewayResult<Self> {
        let endpoints = config
            .endpoints
            .iter()
            .map(|e| {
                PushEndpoint::new(e.clone(), config.timeout_secs)
                    .map(|p| Arc::new(p) as Arc<dyn Broadcaster>)
            })
            .collect::<GatewayResult<Vec<_>>>()?;
        Ok(Self::new(endpoints, config.timeout_secs))
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Push `raw_hex` everywhere; returns the name of the accepting endpoint.
    ///
    /// Each push runs as its own task, so endpoints slower than the first
    /// acceptance still receive the transaction.
    pub async fn broadcast(&self, txid: &str, raw_hex: &str) -> GatewayResult<String> {
        let deadline = Duration::from_secs(self.timeout_secs);
        let raw: Arc<str> = Arc::from(raw_hex);
        let txid_owned: Arc<str> = Arc::from(txid);

        let attempts = self.endpoints.iter().map(|endpoint| {
            let endpoint = Arc::clone(endpoint);
            let raw = Arc::clone(&raw);
            let txid = Arc::clone(&txid_owned);
            let push = tokio::spawn(async move {
                let name = endpoint.name().to_string();
                let outcome = match timeout(deadline, endpoint.push_transaction(&raw)).await {
                    Ok(Ok(true)) => Ok(name.clone()),
                    Ok(Ok(false)) => Err(format!("{}: rejected", name)),
                    Ok(Err(e)) => Err(format!("{}: {}", name, e)),
                    Err(_) => Err(format!("{}: timeout", name)),
                };
                metrics::record_broadcast(&name, outcome.is_ok());
                if let Err(reason) = &outcome {
                    tracing::warn!(txid = %txid, endpoint = %name, reason = %reason, "Push endpoint failed");
                }
                outcome
            });
            async move { push.await.unwrap_or_else(|e| Err(format!("push task: {e}"))) }
        });

        match first_success(attempts).await {
            Ok(accepted_by) => {
                tracing::info!(txid, endpoint = %accepted_by, "Transaction broadcast");
                Ok(accepted_by)
            }
            Err(all) => {
                tracing::error!(txid, errors = ?all.errors, "Every push endpoint failed");
                Err(GatewayError::BroadcastRejected(all.errors.join("; ")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::memory::ScriptedBroadcaster;

    fn pool(a: ScriptedBroadcaster, b: ScriptedBroadcaster) -> BroadcastPool {
        BroadcastPool::new(vec![Arc::new(a), Arc::new(b)], 5)
    }

    #[tokio::test]
    async fn test_one_acceptance_is_enough() {
        let a = ScriptedBroadcaster::rejecting("a");
        let b = ScriptedBroadcaster::accepting("b");
        let accepted = pool(a.clone(), b.clone()).broadcast("tx", "00").await.unwrap();
        assert_eq!(accepted, "b");
        assert_eq!(b.pushed(), vec!["00".to_string()]);
    }

    #[tokio::test]
    async fn test_both_failing_is_an_error() {
        let a = ScriptedBroadcaster::rejecting("a");
        let b = ScriptedBroadcaster::failing("b");
        let err = pool(a, b).broadcast("tx", "00").await.unwrap_err();
        match err {
            GatewayError::BroadcastRejected(msg) => {
                assert!(msg.contains("a: rejected"));
                assert!(msg.contains("b:"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    struct SlowBroadcaster {
        inner: ScriptedBroadcaster,
        delay: Duration,
    }

    #[async_trait]
    impl Broadcaster for SlowBroadcaster {
        fn name(&self) -> &str {
            self.inner.name()
        }

        async fn push_transaction(&self, raw_hex: &str) -> GatewayResult<bool> {
            tokio::time::sleep(self.delay).await;
            self.inner.push_transaction(raw_hex).await
        }
    }

    #[tokio::test]
    async fn test_slow_endpoint_still_receives_push() {
        let fast = ScriptedBroadcaster::accepting("fast");
        let slow = ScriptedBroadcaster::accepting("slow");
        let pool = BroadcastPool::new(
            vec![
                Arc::new(fast.clone()),
                Arc::new(SlowBroadcaster {
                    inner: slow.clone(),
                    delay: Duration::from_millis(50),
                }),
            ],
            5,
        );

        assert_eq!(pool.broadcast("tx", "00").await.unwrap(), "fast");
        assert!(slow.pushed().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(slow.pushed(), vec!["00".to_string()]);
    }

    #[test]
    fn test_from_config_builds_every_endpoint() {
        let pool = BroadcastPool::from_config(&BroadcastConfig::default()).unwrap();
        assert_eq!(pool.endpoint_count(), 2);
    }
}
