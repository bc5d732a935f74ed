//! Request bodies.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Header carrying the request id set by the server layers.
pub const X_REQUEST_ID: &str = "x-request-id";

#[derive(Debug, Deserialize)]
pub struct RegistrationRequest {
    pub bitcoin_address: String,
    pub signature: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ForwardingRequest {
    pub nick: String,
    pub win_address: String,
}

#[derive(Debug, Deserialize)]
pub struct SponsorRequest {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct WinnerTxidRequest {
    pub txid: String,
}

/// Address notification from the chain data provider. Only the keys of
/// `addresses` are used.
#[derive(Debug, Default, Deserialize)]
pub struct AddressHook {
    #[serde(default)]
    pub addresses: BTreeMap<String, serde_json::Value>,
}

impl AddressHook {
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.addresses.keys().map(String::as_str)
    }
}
