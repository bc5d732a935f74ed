//! Public draw reports and their independent verification.

use serde::{Deserialize, Serialize};

use crate::error::{SettlementError, SettlementResult};
use crate::ledger::queries::{draws, payments, sponsors, watermarks};
use crate::ledger::LedgerStore;
use crate::settlement::schedule::DrawSchedule;
use crate::settlement::selection::{select_winner, ticket_ranges, winning_ticket, TicketEntry, TicketRange};
use crate::settlement::stretch::Stretcher;
use crate::settlement::DrawState;

/// Everything a third party needs to recompute a draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawReport {
    pub draw_id: u64,
    pub state: DrawState,
    pub hash_height: u64,
    pub block_hash: Option<String>,
    pub stretched_hash: Option<String>,
    pub tickets_bought: u64,
    pub winning_ticket: Option<i64>,
    pub winning_txid: Option<String>,
    pub winning_vout: Option<u32>,
    pub winner_bonus: Option<u64>,
    pub bonus_carry: u64,
    pub sponsor_contribution: u64,
    pub winner_txid: Option<String>,
    /// Non-dust tickets in public order.
    pub tickets: Vec<TicketRange>,
    pub sponsors: Vec<SponsorLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorLine {
    pub sponsor_id: u32,
    pub name: String,
    pub amount: u64,
}

/// Result of recomputing a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub stretched_hash: String,
    pub stretch_matches: bool,
    pub winning_ticket: Option<u64>,
    pub winner: Option<TicketRange>,
    pub winner_matches: bool,
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        self.stretch_matches && self.winner_matches
    }
}

/// Build the public report for `draw_id`.
pub async fn draw_report(
    ledger: &LedgerStore,
    schedule: &DrawSchedule,
    pot_address: &str,
    draw_id: u64,
) -> SettlementResult<DrawReport> {
    let pot = pot_address.to_string();
    let (draw, entries, sponsor_totals, watermark) = ledger
        .read(move |c| {
            let draw = draws::get(c, draw_id)?;
            let entries = payments::tickets(c, draw_id)?;
            let sponsor_totals = sponsors::totals_for_draw(c, draw_id, 250)?;
            let watermark = watermarks::get(c, &pot)?.unwrap_or(0);
            Ok((draw, entries, sponsor_totals, watermark))
        })
        .await?;

    let draw = draw.ok_or_else(|| SettlementError::validation(format!("draw {draw_id} does not exist")))?;

    let entries: Vec<TicketEntry> = entries
        .into_iter()
        .map(|p| TicketEntry {
            txid: p.txid,
            vout: p.vout,
            amount: p.amount,
        })
        .collect();
    let tickets = ticket_ranges(&entries);
    let tickets_bought = if draw.is_finalized() {
        draw.tickets_bought
    } else {
        tickets.last().map_or(0, |r| r.to)
    };

    Ok(DrawReport {
        draw_id,
        state: DrawState::at(&draw, schedule, watermark),
        hash_height: schedule.hash_height(draw_id),
        block_hash: draw.block_hash,
        stretched_hash: draw.stretched_hash,
        tickets_bought,
        winning_ticket: draw.winning_ticket,
        winning_txid: draw.winning_payment_txid,
        winning_vout: draw.winning_payment_vout,
        winner_bonus: draw.winner_bonus,
        bonus_carry: draw.bonus_carry,
        sponsor_contribution: draw.sponsor_contribution,
        winner_txid: draw.winner_txid,
        tickets,
        sponsors: sponsor_totals
            .into_iter()
            .map(|s| SponsorLine {
                sponsor_id: s.sponsor_id,
                name: s.name,
                amount: s.amount,
            })
            .collect(),
    })
}

/// Recompute the stretch and the winner of a finalized report.
pub fn verify_report(report: &DrawReport, stretcher: &Stretcher) -> SettlementResult<Verification> {
    let block_hash = report
        .block_hash
        .as_deref()
        .ok_or_else(|| SettlementError::validation(format!("draw {} is not finalized", report.draw_id)))?;

    let stretched = stretcher.stretch_blocking(block_hash)?;
    let stretch_matches = report
        .stretched_hash
        .as_deref()
        .is_some_and(|s| s.eq_ignore_ascii_case(&stretched));

    let total = report.tickets.last().map_or(0, |r| r.to);
    let ticket = winning_ticket(&stretched, total);
    let winner = ticket.and_then(|t| select_winner(&report.tickets, t)).cloned();

    let winner_matches = match (&winner, &report.winning_txid) {
        (Some(w), Some(txid)) => {
            w.txid == *txid
                && Some(w.vout) == report.winning_vout
                && report.winning_ticket == ticket.map(|t| t as i64)
        }
        (None, None) => report.winning_ticket.map_or(true, |t| t < 0),
        _ => false,
    };

    Ok(Verification {
        stretched_hash: stretched,
        stretch_matches,
        winning_ticket: ticket,
        winner,
        winner_matches,
    })
}
