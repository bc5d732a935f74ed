//! Sponsors, registrations and forwarding deposit addresses.
//!
//! # Responsibilities
//! - Create sponsors with a derived deposit address and a seeded watermark
//! - Accept self-signed payout registrations
//! - Generate forwarding deposit addresses and their first check
//! - Produce attestation-signed guarantees for forwarding addresses
//!
//! Every request is validated in full before the ledger is touched.

pub mod validation;

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{SettlementError, SettlementResult};
use crate::keys::KeyService;
use crate::ledger::queries::addresses::{self, RegisteredAddressRow};
use crate::ledger::queries::payments::PaymentKind;
use crate::ledger::queries::sequences::{self, FORWARDING_INDEX, SPONSOR_INDEX};
use crate::ledger::queries::{sponsors, watermarks};
use crate::ledger::queries::sponsors::SponsorRow;
use crate::ledger::{LedgerError, LedgerStore};

use validation::{RegistrationMessage, PURPOSE};

/// Attestation over a forwarding registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Guarantee {
    pub message: String,
    pub signature: String,
    pub address: String,
}

#[derive(Clone)]
pub struct Registry {
    ledger: LedgerStore,
    keys: Arc<KeyService>,
    base_interval_secs: i64,
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Registry {
    pub fn new(ledger: LedgerStore, keys: Arc<KeyService>, base_interval_secs: i64) -> Self {
        Self {
            ledger,
            keys,
            base_interval_secs,
        }
    }

    /// Create a sponsor. Its id is also its derivation index.
    pub async fn create_sponsor(&self, name: &str, url: &str, now: DateTime<Utc>) -> SettlementResult<SponsorRow> {
        let name = validation::sponsor_name(name)?;
        let url = validation::sponsor_url(url)?.to_string();
        let keys = Arc::clone(&self.keys);
        let created = timestamp(now);

        let sponsor = self
            .ledger
            .write("create sponsor", move |tx| {
                let index = sequences::next_value(tx, SPONSOR_INDEX)?;
                let address = keys
                    .derive_sponsor_address(index)
                    .map_err(|e| LedgerError::Invariant(e.to_string()))?
                    .to_string();
                watermarks::ensure(tx, &address, PaymentKind::Sponsor, 0)?;
                let row = SponsorRow {
                    id: index,
                    name: name.clone(),
                    url: url.clone(),
                    bitcoin_address: address,
                    derivation_index: index,
                    created: created.clone(),
                };
                sponsors::insert(tx, &row)?;
                Ok(row)
            })
            .await?;

        tracing::info!(sponsor_id = sponsor.id, address = %sponsor.bitcoin_address, "Sponsor created");
        Ok(sponsor)
    }

    /// Store a registration signed by the owner of `address`.
    pub async fn register_address(
        &self,
        address: &str,
        signature: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> SettlementResult<RegisteredAddressRow> {
        let network = self.keys.network();
        let parsed_address = validation::address(address, network, "bitcoin_address")?;
        let signature = validation::signature(signature)?;
        let message = message.trim().to_string();
        validation::registration_message(&message, network)?;

        let verified = self
            .keys
            .verify_message(&parsed_address, &signature, &message)
            .map_err(|e| SettlementError::validation(e.to_string()))?;
        if !verified {
            return Err(SettlementError::validation("signature does not match address and message"));
        }

        let row = RegisteredAddressRow {
            id: Uuid::new_v4().to_string(),
            bitcoin_address: parsed_address.to_string(),
            message,
            signature,
            forwarding_index: None,
            forwarding_last_check: None,
            forwarding_next_check_secs: None,
            created: timestamp(now),
        };
        let insert = row.clone();
        self.ledger
            .write("register address", move |tx| addresses::insert_registration(tx, &insert))
            .await?;

        tracing::info!(registration_id = %row.id, address = %row.bitcoin_address, "Address registered");
        Ok(row)
    }

    /// Generate a forwarding deposit address paying out to `win_address`.
    ///
    /// The registration message is signed by the new forwarding key and the
    /// first check is scheduled one base interval out.
    pub async fn create_forwarding_address(
        &self,
        nick: &str,
        win_address: &str,
        now: DateTime<Utc>,
    ) -> SettlementResult<RegisteredAddressRow> {
        let nick = validation::nick(nick)?;
        let win_address = validation::address(win_address, self.keys.network(), "win_address")?.to_string();

        let keys = Arc::clone(&self.keys);
        let id = Uuid::new_v4().to_string();
        let created = timestamp(now);
        let base_interval = self.base_interval_secs;

        let row = self
            .ledger
            .write("create forwarding address", move |tx| {
                let index = sequences::next_value(tx, FORWARDING_INDEX)?;
                let key = keys
                    .derive_forwarding_key(index)
                    .map_err(|e| LedgerError::Invariant(e.to_string()))?;
                let message = serde_json::to_string(&RegistrationMessage {
                    nick: nick.clone(),
                    win_address: win_address.clone(),
                    time: created.clone(),
                    purpose: PURPOSE.to_string(),
                })
                .map_err(|e| LedgerError::Invariant(e.to_string()))?;
                let signature = keys.sign_with(&key, &message);

                let row = RegisteredAddressRow {
                    id: id.clone(),
                    bitcoin_address: key.address.to_string(),
                    message,
                    signature,
                    forwarding_index: Some(index),
                    forwarding_last_check: Some(now.timestamp()),
                    forwarding_next_check_secs: Some(base_interval),
                    created: created.clone(),
                };
                addresses::insert_registration(tx, &row)?;
                Ok(row)
            })
            .await?;

        tracing::info!(
            registration_id = %row.id,
            forwarding_index = ?row.forwarding_index,
            address = %row.bitcoin_address,
            "Forwarding address created"
        );
        Ok(row)
    }

    pub async fn registration(&self, id: &str) -> SettlementResult<Option<RegisteredAddressRow>> {
        let id = id.to_string();
        Ok(self.ledger.read(move |c| addresses::get(c, &id)).await?)
    }

    pub async fn forwarding_by_address(&self, address: &str) -> SettlementResult<Option<RegisteredAddressRow>> {
        let address = address.to_string();
        Ok(self
            .ledger
            .read(move |c| addresses::get_forwarding_by_address(c, &address))
            .await?)
    }

    pub async fn list_sponsors(&self) -> SettlementResult<Vec<SponsorRow>> {
        Ok(self.ledger.read(sponsors::list).await?)
    }

    /// Guarantee for a forwarding registration; `None` for self-signed ones.
    pub async fn guarantee(&self, id: &str) -> SettlementResult<Option<Guarantee>> {
        let Some(registration) = self.registration(id).await? else {
            return Err(SettlementError::validation(format!("unknown registration {id}")));
        };
        if !registration.is_forwarding() {
            return Ok(None);
        }
        Ok(Some(self.guarantee_for(&registration)?))
    }

    pub fn guarantee_for(&self, registration: &RegisteredAddressRow) -> SettlementResult<Guarantee> {
        let details: RegistrationMessage = serde_json::from_str(&registration.message)
            .map_err(|e| SettlementError::Invariant(format!("stored registration message: {e}")))?;
        let message = guarantee_text(&registration.bitcoin_address, &registration.created, &details.win_address);
        Ok(Guarantee {
            signature: self.keys.sign_guarantee(&message),
            address: self.keys.guarantee_address().to_string(),
            message,
        })
    }
}

pub fn guarantee_text(forwarding_address: &str, created: &str, win_address: &str) -> String {
    format!(
        "PevPot generated {forwarding_address} as a forwarding address on {created}. \
         All funds sent to it will be forwarded to the lotto address and should it win, \
         all prize money will be sent to {win_address}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::keys::test_keys;
    use chrono::TimeZone;

    const WIN: &str = "1BoatSLRHtKNngkdXEeobR76b53LETtpyT";

    fn registry() -> (Registry, LedgerStore) {
        let store = LedgerStore::open_memory().unwrap();
        (Registry::new(store.clone(), Arc::new(test_keys::service()), 600), store)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 11, 2, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_create_sponsor_seeds_watermark() {
        let (registry, store) = registry();
        let first = registry.create_sponsor("Acme", "https://acme.example", now()).await.unwrap();
        let second = registry.create_sponsor("Beta", "http://beta.example/x", now()).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_ne!(first.bitcoin_address, second.bitcoin_address);
        assert_eq!(
            first.bitcoin_address,
            test_keys::service().derive_sponsor_address(1).unwrap().to_string()
        );

        let address = first.bitcoin_address.clone();
        let watermark = store.read(move |c| watermarks::get(c, &address)).await.unwrap();
        assert_eq!(watermark, Some(0));
        assert_eq!(registry.list_sponsors().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_sponsor_allocates_nothing() {
        let (registry, _) = registry();
        let err = registry.create_sponsor("Acme", "ftp://acme", now()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let ok = registry.create_sponsor("Acme", "https://acme.example", now()).await.unwrap();
        assert_eq!(ok.id, 1);
    }

    #[tokio::test]
    async fn test_forwarding_registration_is_self_signed() {
        let (registry, _) = registry();
        let row = registry.create_forwarding_address("satoshi", WIN, now()).await.unwrap();
        assert_eq!(row.forwarding_index, Some(1));
        assert_eq!(row.forwarding_last_check, Some(now().timestamp()));
        assert_eq!(row.forwarding_next_check_secs, Some(600));

        let keys = test_keys::service();
        let key = keys.derive_forwarding_key(1).unwrap();
        assert_eq!(row.bitcoin_address, key.address.to_string());
        assert!(keys.verify_message(&key.address, &row.signature, &row.message).unwrap());

        let message: RegistrationMessage = serde_json::from_str(&row.message).unwrap();
        assert_eq!(message.win_address, WIN);
        assert_eq!(message.purpose, "pevpot");

        let found = registry.forwarding_by_address(&row.bitcoin_address).await.unwrap();
        assert_eq!(found.map(|r| r.id), Some(row.id));
    }

    #[tokio::test]
    async fn test_guarantee_is_signed_by_attestation_key() {
        let (registry, _) = registry();
        let row = registry.create_forwarding_address("satoshi", WIN, now()).await.unwrap();
        let guarantee = registry.guarantee(&row.id).await.unwrap().unwrap();

        assert!(guarantee.message.starts_with(&format!("PevPot generated {}", row.bitcoin_address)));
        assert!(guarantee.message.ends_with(WIN));
        assert!(guarantee.message.contains("2015-11-02T10:00:00.000Z"));

        let keys = test_keys::service();
        assert_eq!(guarantee.address, keys.guarantee_address().to_string());
        assert!(keys
            .verify_message(&keys.guarantee_address(), &guarantee.signature, &guarantee.message)
            .unwrap());
    }

    #[tokio::test]
    async fn test_register_address_verifies_signature() {
        let (registry, _) = registry();
        let keys = test_keys::service();
        let key = keys.derive_forwarding_key(77).unwrap();
        let message = serde_json::json!({
            "nick": "hal",
            "win_address": WIN,
            "time": "2015-11-02T09:59:00Z",
            "purpose": "pevpot",
        })
        .to_string();
        let signature = keys.sign_with(&key, &message);
        let address = key.address.to_string();

        let row = registry.register_address(&address, &signature, &message, now()).await.unwrap();
        assert!(!row.is_forwarding());
        assert!(registry.guarantee(&row.id).await.unwrap().is_none());

        let other = keys.derive_forwarding_key(78).unwrap().address.to_string();
        let err = registry.register_address(&other, &signature, &message, now()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = registry.guarantee("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
