//! Sweep transaction construction.
//!
//! Every unspent output of a forwarding address goes into one legacy
//! P2PKH transaction with a single output to the pot.

use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize;
use bitcoin::ecdsa::Signature;
use bitcoin::hashes::Hash;
use bitcoin::script::PushBytesBuf;
use bitcoin::secp256k1::{All, Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{Address, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};

use crate::chain::{GatewayError, Unspent};
use crate::error::{SettlementError, SettlementResult};
use crate::keys::ForwardingKey;

/// A signed sweep ready to broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedSweep {
    pub txid: String,
    pub raw_hex: String,
    pub size: usize,
    pub total_input: u64,
    pub fee: u64,
    pub output: u64,
}

/// Build and sign a sweep paying `total - fee` to `destination`.
///
/// Returns `None` when nothing worth forwarding remains: no inputs, or an
/// output below `dust_threshold` after the fee.
pub fn build_sweep(
    secp: &Secp256k1<All>,
    key: &ForwardingKey,
    inputs: &[Unspent],
    destination: &Address,
    fee: u64,
    dust_threshold: u64,
) -> SettlementResult<Option<SignedSweep>> {
    let total_input = inputs
        .iter()
        .try_fold(0u64, |acc, u| acc.checked_add(u.amount))
        .ok_or_else(|| SettlementError::Invariant("unspent total overflows".to_string()))?;

    let output = match total_input.checked_sub(fee) {
        Some(v) if v >= dust_threshold && v > 0 => v,
        _ => return Ok(None),
    };

    let tx_inputs = inputs
        .iter()
        .map(|u| {
            let txid = Txid::from_str(&u.txid)
                .map_err(|e| GatewayError::Malformed(format!("unspent txid {}: {e}", u.txid)))?;
            Ok(TxIn {
                previous_output: OutPoint { txid, vout: u.vout },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
        })
        .collect::<SettlementResult<Vec<_>>>()?;

    let mut tx = Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input: tx_inputs,
        output: vec![TxOut {
            value: Amount::from_sat(output),
            script_pubkey: destination.script_pubkey(),
        }],
    };

    let script_sigs = sign_inputs(secp, key, &tx)?;
    for (input, script_sig) in tx.input.iter_mut().zip(script_sigs) {
        input.script_sig = script_sig;
    }

    let bytes = serialize(&tx);
    Ok(Some(SignedSweep {
        txid: tx.compute_txid().to_string(),
        raw_hex: hex::encode(&bytes),
        size: bytes.len(),
        total_input,
        fee,
        output,
    }))
}

fn sign_inputs(
    secp: &Secp256k1<All>,
    key: &ForwardingKey,
    tx: &Transaction,
) -> SettlementResult<Vec<ScriptBuf>> {
    let prevout_script = key.address.script_pubkey();
    let cache = SighashCache::new(tx);

    (0..tx.input.len())
        .map(|index| {
            let sighash = cache
                .legacy_signature_hash(index, &prevout_script, EcdsaSighashType::All.to_u32())
                .map_err(|e| SettlementError::Invariant(format!("sighash for input {index}: {e}")))?;
            let message = Message::from_digest(sighash.to_byte_array());
            let signature = Signature {
                signature: secp.sign_ecdsa(&message, &key.private_key.inner),
                sighash_type: EcdsaSighashType::All,
            };
            let push = PushBytesBuf::try_from(signature.to_vec())
                .map_err(|e| SettlementError::Invariant(format!("signature push: {e}")))?;

            Ok(ScriptBuf::builder()
                .push_slice(push)
                .push_key(&key.public_key)
                .into_script())
        })
        .collect()
}
