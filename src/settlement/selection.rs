//! Weighted ticket selection.
//!
//! One satoshi is one ticket. Payments are ordered by `(txid, vout)` and
//! each owns `[running_total - amount, running_total)`. Anyone holding the
//! public payment list and the stretched hash can redo this.

use serde::{Deserialize, Serialize};

/// A non-dust payment as it takes part in a draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketEntry {
    pub txid: String,
    pub vout: u32,
    pub amount: u64,
}

/// A payment with its half-open ticket range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRange {
    pub txid: String,
    pub vout: u32,
    pub amount: u64,
    /// Inclusive.
    pub from: u64,
    /// Exclusive.
    pub to: u64,
}

impl TicketRange {
    pub fn contains(&self, ticket: u64) -> bool {
        ticket >= self.from && ticket < self.to
    }
}

/// `stretched mod tickets_bought`, reading the hex digits as one big-endian
/// unsigned integer. `None` when no tickets were sold or the hex is invalid.
pub fn winning_ticket(stretched_hex: &str, tickets_bought: u64) -> Option<u64> {
    if tickets_bought == 0 {
        return None;
    }
    let modulus = tickets_bought as u128;
    let mut remainder: u128 = 0;
    for c in stretched_hex.chars() {
        let digit = c.to_digit(16)? as u128;
        remainder = (remainder * 16 + digit) % modulus;
    }
    Some(remainder as u64)
}

/// Ranges in public ticket order. Zero-amount entries get empty ranges.
pub fn ticket_ranges(entries: &[TicketEntry]) -> Vec<TicketRange> {
    let mut sorted: Vec<&TicketEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.txid.cmp(&b.txid).then(a.vout.cmp(&b.vout)));

    let mut running = 0u64;
    sorted
        .into_iter()
        .map(|e| {
            let from = running;
            running = running.saturating_add(e.amount);
            TicketRange {
                txid: e.txid.clone(),
                vout: e.vout,
                amount: e.amount,
                from,
                to: running,
            }
        })
        .collect()
}

/// The range holding `ticket`.
pub fn select_winner(ranges: &[TicketRange], ticket: u64) -> Option<&TicketRange> {
    ranges.iter().find(|r| r.contains(ticket))
}
