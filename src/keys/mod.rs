//! Key derivation and message signing.
//!
//! # Responsibilities
//! - Derive sponsor deposit addresses from the sponsor xpub (address only)
//! - Derive forwarding deposit keypairs from the forwarding xprv (can sign)
//! - Sign guarantees with the fixed attestation key
//! - Verify Bitcoin signed messages for address registration
//!
//! # Security
//! - Extended private keys and WIFs come from config/environment only
//! - Derived private material is never persisted; `(seed, index)` always
//!   reproduces the same key, so the ledger only stores the index

pub mod message;

use std::fmt;
use std::str::FromStr;

use bitcoin::bip32::{ChildNumber, Xpriv, Xpub};
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::{Address, AddressType, Network, NetworkKind, PrivateKey, PublicKey};
use thiserror::Error;

use crate::config::KeyConfig;

/// Errors from key parsing, derivation and signature checks.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Malformed or wrong-network address.
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Unknown network name.
    #[error("unknown network '{0}'")]
    UnknownNetwork(String),

    /// Malformed extended key or WIF.
    #[error("invalid key material for {what}: {reason}")]
    InvalidKey { what: &'static str, reason: String },

    /// Child derivation failed.
    #[error("derivation failed at index {index}: {reason}")]
    Derivation { index: u32, reason: String },

    /// Malformed signature encoding.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

/// Result type for key operations.
pub type KeyResult<T> = Result<T, KeyError>;

/// Parse a network name as used in configuration.
pub fn parse_network(name: &str) -> KeyResult<Network> {
    Network::from_str(name).map_err(|_| KeyError::UnknownNetwork(name.to_string()))
}

/// Parse a base58 (P2PKH or P2SH) address and require it to belong to
/// `network`. Signed messages and sweeps only work with legacy addresses.
pub fn parse_address(address: &str, network: Network) -> KeyResult<Address> {
    let invalid = |reason: String| KeyError::InvalidAddress {
        address: address.to_string(),
        reason,
    };
    let parsed = Address::from_str(address)
        .map_err(|e| invalid(e.to_string()))?
        .require_network(network)
        .map_err(|e| invalid(e.to_string()))?;
    match parsed.address_type() {
        Some(AddressType::P2pkh | AddressType::P2sh) => Ok(parsed),
        other => Err(invalid(format!(
            "unsupported address type {}",
            other.map_or_else(|| "unknown".to_string(), |t| t.to_string())
        ))),
    }
}

/// A derived forwarding deposit key.
#[derive(Clone)]
pub struct ForwardingKey {
    pub index: u32,
    pub private_key: PrivateKey,
    pub public_key: PublicKey,
    pub address: Address,
}

impl fmt::Debug for ForwardingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardingKey")
            .field("index", &self.index)
            .field("address", &self.address.to_string())
            .finish()
    }
}

/// Deterministic key service over the two root keys and the attestation key.
#[derive(Clone)]
pub struct KeyService {
    secp: Secp256k1<All>,
    network: Network,
    sponsor_xpub: Xpub,
    forwarding_xprv: Xpriv,
    attestation: PrivateKey,
}

impl KeyService {
    /// Build the service from already-parsed keys.
    pub fn new(
        network: Network,
        sponsor_xpub: Xpub,
        forwarding_xprv: Xpriv,
        attestation: PrivateKey,
    ) -> KeyResult<Self> {
        let kind = NetworkKind::from(network);
        if sponsor_xpub.network != kind {
            return Err(KeyError::InvalidKey {
                what: "sponsor_xpub",
                reason: format!("key is for {:?}, configured {}", sponsor_xpub.network, network),
            });
        }
        if forwarding_xprv.network != kind {
            return Err(KeyError::InvalidKey {
                what: "forwarding_xprv",
                reason: format!("key is for {:?}, configured {}", forwarding_xprv.network, network),
            });
        }

        let service = Self {
            secp: Secp256k1::new(),
            network,
            sponsor_xpub,
            forwarding_xprv,
            attestation,
        };

        tracing::info!(
            network = %network,
            guarantee_address = %service.guarantee_address(),
            "Key service initialized"
        );
        Ok(service)
    }

    /// Parse the key configuration (after environment overrides).
    pub fn from_config(config: &KeyConfig, network: Network) -> KeyResult<Self> {
        let sponsor_xpub =
            Xpub::from_str(config.sponsor_xpub.trim()).map_err(|e| KeyError::InvalidKey {
                what: "sponsor_xpub",
                reason: e.to_string(),
            })?;
        let forwarding_xprv =
            Xpriv::from_str(config.forwarding_xprv.trim()).map_err(|e| KeyError::InvalidKey {
                what: "forwarding_xprv",
                reason: e.to_string(),
            })?;
        let attestation =
            PrivateKey::from_wif(config.attestation_wif.trim()).map_err(|e| KeyError::InvalidKey {
                what: "attestation_wif",
                reason: e.to_string(),
            })?;

        Self::new(network, sponsor_xpub, forwarding_xprv, attestation)
    }

    /// Network all derived addresses belong to.
    pub fn network(&self) -> Network {
        self.network
    }

    /// Shared secp256k1 context.
    pub fn secp(&self) -> &Secp256k1<All> {
        &self.secp
    }

    /// Sponsor deposit address at `index` (public derivation, no private key).
    pub fn derive_sponsor_address(&self, index: u32) -> KeyResult<Address> {
        let child = normal_child(index)?;
        let derived = self
            .sponsor_xpub
            .derive_pub(&self.secp, &[child])
            .map_err(|e| KeyError::Derivation {
                index,
                reason: e.to_string(),
            })?;
        let public_key = PublicKey::new(derived.public_key);
        Ok(Address::p2pkh(public_key.pubkey_hash(), self.network))
    }

    /// Forwarding deposit keypair at `index`.
    pub fn derive_forwarding_key(&self, index: u32) -> KeyResult<ForwardingKey> {
        let child = normal_child(index)?;
        let derived = self
            .forwarding_xprv
            .derive_priv(&self.secp, &[child])
            .map_err(|e| KeyError::Derivation {
                index,
                reason: e.to_string(),
            })?;
        let private_key = derived.to_priv();
        let public_key = private_key.public_key(&self.secp);
        let address = Address::p2pkh(public_key.pubkey_hash(), self.network);

        Ok(ForwardingKey {
            index,
            private_key,
            public_key,
            address,
        })
    }

    /// Address of the attestation key. It never receives funds.
    pub fn guarantee_address(&self) -> Address {
        let public_key = self.attestation.public_key(&self.secp);
        Address::p2pkh(public_key.pubkey_hash(), self.network)
    }

    /// Sign a guarantee message with the attestation key (base64 signed message).
    pub fn sign_guarantee(&self, text: &str) -> String {
        message::sign(&self.secp, &self.attestation, text)
    }

    /// Sign `text` with a forwarding key.
    pub fn sign_with(&self, key: &ForwardingKey, text: &str) -> String {
        message::sign(&self.secp, &key.private_key, text)
    }

    /// Check a base64 signed message against `address`.
    pub fn verify_message(&self, address: &Address, signature: &str, text: &str) -> KeyResult<bool> {
        message::verify(&self.secp, address, signature, text)
    }
}

impl fmt::Debug for KeyService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyService")
            .field("network", &self.network)
            .field("sponsor_xpub", &self.sponsor_xpub.to_string())
            .finish_non_exhaustive()
    }
}

fn normal_child(index: u32) -> KeyResult<ChildNumber> {
    ChildNumber::from_normal_idx(index).map_err(|e| KeyError::Derivation {
        index,
        reason: e.to_string(),
    })
}
