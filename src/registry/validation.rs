//! Input checks for sponsor and registration requests. Nothing here
//! touches the ledger or the network.

use bitcoin::base64::engine::general_purpose::STANDARD;
use bitcoin::base64::Engine;
use bitcoin::{Address, Network};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{SettlementError, SettlementResult};
use crate::keys::parse_address;

pub const MAX_SPONSOR_NAME: usize = 100;
pub const MAX_SPONSOR_URL: usize = 1024;
pub const MAX_NICK: usize = 100;
/// Bounds on signature and message lengths, in characters.
pub const MIN_FIELD: usize = 10;
pub const MAX_FIELD: usize = 2048;

/// The JSON document a registrant signs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationMessage {
    pub nick: String,
    pub win_address: String,
    pub time: String,
    pub purpose: String,
}

pub const PURPOSE: &str = "pevpot";

pub fn sponsor_name(name: &str) -> SettlementResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SettlementError::validation("sponsor name is required"));
    }
    if name.chars().count() > MAX_SPONSOR_NAME {
        return Err(SettlementError::validation(format!(
            "sponsor name longer than {MAX_SPONSOR_NAME} characters"
        )));
    }
    Ok(name.to_string())
}

pub fn sponsor_url(raw: &str) -> SettlementResult<Url> {
    let raw = raw.trim();
    if raw.chars().count() > MAX_SPONSOR_URL {
        return Err(SettlementError::validation(format!(
            "sponsor url longer than {MAX_SPONSOR_URL} characters"
        )));
    }
    let url = Url::parse(raw).map_err(|e| SettlementError::validation(format!("sponsor url: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SettlementError::validation("sponsor url must be http or https"));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(SettlementError::validation("sponsor url has no host"));
    }
    Ok(url)
}

pub fn nick(nick: &str) -> SettlementResult<String> {
    let nick = nick.trim();
    if nick.chars().count() > MAX_NICK {
        return Err(SettlementError::validation(format!("nick longer than {MAX_NICK} characters")));
    }
    Ok(nick.to_string())
}

pub fn address(raw: &str, network: Network, field: &str) -> SettlementResult<Address> {
    parse_address(raw.trim(), network).map_err(|e| SettlementError::validation(format!("{field}: {e}")))
}

fn length(field: &str, value: &str) -> SettlementResult<()> {
    let len = value.chars().count();
    if !(MIN_FIELD..=MAX_FIELD).contains(&len) {
        return Err(SettlementError::validation(format!(
            "{field} must be {MIN_FIELD} to {MAX_FIELD} characters, got {len}"
        )));
    }
    Ok(())
}

pub fn signature(raw: &str) -> SettlementResult<String> {
    let raw = raw.trim();
    length("signature", raw)?;
    STANDARD
        .decode(raw)
        .map_err(|e| SettlementError::validation(format!("signature is not base64: {e}")))?;
    Ok(raw.to_string())
}

/// Parse and check a registration message.
pub fn registration_message(raw: &str, network: Network) -> SettlementResult<RegistrationMessage> {
    let raw = raw.trim();
    length("message", raw)?;
    let message: RegistrationMessage = serde_json::from_str(raw)
        .map_err(|e| SettlementError::validation(format!("message is not a registration document: {e}")))?;

    address(&message.win_address, network, "win_address")?;
    DateTime::parse_from_rfc3339(&message.time)
        .map_err(|e| SettlementError::validation(format!("message time is not RFC 3339: {e}")))?;
    if message.purpose != PURPOSE {
        return Err(SettlementError::validation(format!("purpose must be {PURPOSE}")));
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const WIN: &str = "1BoatSLRHtKNngkdXEeobR76b53LETtpyT";

    fn message(purpose: &str, time: &str, win: &str) -> String {
        serde_json::json!({ "nick": "satoshi", "win_address": win, "time": time, "purpose": purpose }).to_string()
    }

    #[test]
    fn test_sponsor_fields() {
        assert_eq!(sponsor_name("  Acme  ").unwrap(), "Acme");
        assert!(sponsor_name("").is_err());
        assert!(sponsor_name(&"x".repeat(101)).is_err());
        assert!(sponsor_name(&"x".repeat(100)).is_ok());

        assert!(sponsor_url("https://example.com/a").is_ok());
        assert!(sponsor_url("http://example.com").is_ok());
        assert!(sponsor_url("ftp://example.com").is_err());
        assert!(sponsor_url("not a url").is_err());
        let long = format!("https://example.com/{}", "a".repeat(1024));
        assert!(sponsor_url(&long).is_err());
    }

    #[test]
    fn test_registration_message() {
        let ok = message("pevpot", "2015-11-02T10:00:00.000Z", WIN);
        let parsed = registration_message(&ok, Network::Bitcoin).unwrap();
        assert_eq!(parsed.nick, "satoshi");

        for bad in [
            message("other", "2015-11-02T10:00:00Z", WIN),
            message("pevpot", "yesterday", WIN),
            message("pevpot", "2015-11-02T10:00:00Z", "1NotAnAddress"),
            r#"{"nick": 5, "win_address": "x", "time": "t", "purpose": "pevpot"}"#.to_string(),
            "short".to_string(),
            "this is not json at all".to_string(),
        ] {
            let err = registration_message(&bad, Network::Bitcoin).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{bad}");
        }
    }

    #[test]
    fn test_wrong_network_address() {
        let ok = message("pevpot", "2015-11-02T10:00:00Z", WIN);
        assert!(registration_message(&ok, Network::Testnet).is_err());
    }

    #[test]
    fn test_signature_shape() {
        assert!(signature("SGVsbG8gd29ybGQh").is_ok());
        assert!(signature("c2hvcnQ=").is_err());
        assert!(signature("not base64 at all!!").is_err());
        assert!(signature(&"A".repeat(2052)).is_err());
    }
}
