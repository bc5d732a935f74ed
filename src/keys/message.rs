//! Bitcoin signed-message helpers (the `"Bitcoin Signed Message:\n"` scheme).

use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, Secp256k1, Signing, Verification};
use bitcoin::sign_message::{signed_msg_hash, MessageSignature};
use bitcoin::{Address, PrivateKey};

use super::{KeyError, KeyResult};

/// Sign `text` with `key`, returning the base64 compact signature.
pub fn sign<C: Signing>(secp: &Secp256k1<C>, key: &PrivateKey, text: &str) -> String {
    let digest = signed_msg_hash(text);
    let message = Message::from_digest(digest.to_byte_array());
    let signature = secp.sign_ecdsa_recoverable(&message, &key.inner);
    MessageSignature::new(signature, key.compressed).to_base64()
}

/// Verify a base64 signature over `text` against `address`.
///
/// Returns `Ok(false)` for a well-formed signature by a different key and
/// `Err` when the signature cannot be decoded at all.
pub fn verify<C: Verification>(
    secp: &Secp256k1<C>,
    address: &Address,
    signature: &str,
    text: &str,
) -> KeyResult<bool> {
    let parsed = MessageSignature::from_base64(signature)
        .map_err(|e| KeyError::InvalidSignature(e.to_string()))?;
    let digest = signed_msg_hash(text);
    parsed
        .is_signed_by_address(secp, address, digest)
        .map_err(|e| KeyError::InvalidSignature(e.to_string()))
}
