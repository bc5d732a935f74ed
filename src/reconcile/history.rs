//! Address history walking and payment extraction.

use crate::chain::{ChainGateway, ChainTx, GatewayResult};

/// An output paying the tracked address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedPayment {
    pub txid: String,
    pub vout: u32,
    pub block_height: Option<u64>,
    pub amount: u64,
    /// First input address that decodes. A heuristic: wrong for mixed-input
    /// transactions, kept as-is.
    pub sending_address: Option<String>,
}

/// Outputs of `tx` paying `address`. Outputs without an address are skipped.
pub fn payments_in(tx: &ChainTx, address: &str) -> Vec<ObservedPayment> {
    let sender = tx.inputs.iter().find_map(|i| i.address.clone());

    tx.outputs
        .iter()
        .filter_map(|output| match output.address.as_deref() {
            None => {
                tracing::debug!(txid = %tx.txid, vout = output.index, "Skipping output without address");
                None
            }
            Some(a) if a != address => None,
            Some(_) => Some(ObservedPayment {
                txid: tx.txid.clone(),
                vout: output.index,
                block_height: tx.block_height,
                amount: output.amount,
                sending_address: sender.clone(),
            }),
        })
        .collect()
}

/// Every payment to `address` confirmed at or above `floor`, plus every
/// unconfirmed one.
///
/// Pages arrive newest first; paging stops at the first page that reaches
/// below the floor.
pub async fn fetch_payments(
    gateway: &dyn ChainGateway,
    address: &str,
    floor: u64,
) -> GatewayResult<Vec<ObservedPayment>> {
    let mut payments = Vec::new();
    let mut page = 1;

    loop {
        let history = gateway.address_history_page(address, page).await?;
        let mut reached_floor = false;

        for tx in &history.transactions {
            if matches!(tx.block_height, Some(h) if h < floor) {
                reached_floor = true;
                continue;
            }
            payments.extend(payments_in(tx, address));
        }

        if reached_floor || !history.has_more() || history.transactions.is_empty() {
            break;
        }
        page += 1;
    }

    tracing::debug!(address, floor, pages = page, payments = payments.len(), "Fetched address history");
    Ok(payments)
}
