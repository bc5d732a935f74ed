//! Draw finalization.
//!
//! # Responsibilities
//! - Claim the seeding block hash (write-once)
//! - Sum tickets, pick the winning ticket and payment
//! - Split the bonus pool and carry the remainder into the next draw
//!
//! All of it runs as one ledger unit of work, so the ticket read, the
//! winner lookup and both draw updates commit or roll back together.

use serde::Serialize;

use crate::error::{SettlementError, SettlementResult};
use crate::ledger::queries::draws::{self, DrawOutcome};
use crate::ledger::queries::{addresses, payments};
use crate::ledger::{LedgerError, LedgerResult, LedgerStore};
use crate::observability::metrics;
use crate::settlement::bonus::{split_pool, BonusFraction};
use crate::settlement::schedule::DrawSchedule;
use crate::settlement::selection::winning_ticket;
use crate::settlement::stretch::normalize_hash;

/// A finalized draw with a winner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WinnerResult {
    pub draw_id: u64,
    pub tickets_bought: u64,
    pub winning_ticket: u64,
    pub payment_id: i64,
    pub txid: String,
    pub vout: u32,
    pub amount: u64,
    pub sending_address: Option<String>,
    pub registered_address_id: Option<String>,
    pub fraction: BonusFraction,
    pub winner_bonus: u64,
    pub next_bonus_carry: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FinalizeOutcome {
    Winner(WinnerResult),
    /// Nobody bought a ticket; the whole pool moves to the next draw.
    NoTicketsSold { draw_id: u64, next_bonus_carry: u64 },
}

impl FinalizeOutcome {
    pub fn draw_id(&self) -> u64 {
        match self {
            FinalizeOutcome::Winner(w) => w.draw_id,
            FinalizeOutcome::NoTicketsSold { draw_id, .. } => *draw_id,
        }
    }
}

#[derive(Clone)]
pub struct SettlementEngine {
    ledger: LedgerStore,
    schedule: DrawSchedule,
}

impl SettlementEngine {
    pub fn new(ledger: LedgerStore, schedule: DrawSchedule) -> Self {
        Self { ledger, schedule }
    }

    pub fn schedule(&self) -> &DrawSchedule {
        &self.schedule
    }

    /// Finalize `draw_id` with its seeding `block_hash` and the `stretched`
    /// value derived from it.
    ///
    /// Fails with `AlreadyFinalized` when the hash was claimed before, and
    /// with `Conflict` while the previous draw is open or this draw still
    /// holds unconfirmed tickets.
    pub async fn finalize_draw(
        &self,
        draw_id: u64,
        block_hash: &str,
        stretched: &str,
    ) -> SettlementResult<FinalizeOutcome> {
        if draw_id == 0 {
            return Err(SettlementError::validation("draw ids start at 1"));
        }
        let block_hash = normalize_hash("block_hash", block_hash)?;
        let stretched = normalize_hash("stretched", stretched)?;
        let schedule = self.schedule;

        let result = self
            .ledger
            .write("finalize_draw", move |tx| {
                finalize_unit(tx, &schedule, draw_id, &block_hash, &stretched)
            })
            .await;

        match &result {
            Ok(FinalizeOutcome::Winner(w)) => {
                metrics::record_finalization("winner");
                tracing::info!(
                    draw_id,
                    tickets_bought = w.tickets_bought,
                    winning_ticket = w.winning_ticket,
                    txid = %w.txid,
                    vout = w.vout,
                    winner_bonus = w.winner_bonus,
                    next_bonus_carry = w.next_bonus_carry,
                    "Draw finalized"
                );
            }
            Ok(FinalizeOutcome::NoTicketsSold { next_bonus_carry, .. }) => {
                metrics::record_finalization("no_tickets");
                tracing::info!(draw_id, next_bonus_carry, "Draw finalized with no tickets sold");
            }
            Err(e) => {
                metrics::record_finalization("error");
                tracing::warn!(draw_id, error = %e, "Draw finalization failed");
            }
        }

        Ok(result?)
    }
}

fn finalize_unit(
    tx: &rusqlite::Transaction<'_>,
    schedule: &DrawSchedule,
    draw_id: u64,
    block_hash: &str,
    stretched: &str,
) -> LedgerResult<FinalizeOutcome> {
    draws::claim_block_hash(tx, draw_id, block_hash)?;

    if draw_id > 1 {
        let previous = draws::get(tx, draw_id - 1)?;
        if !previous.as_ref().is_some_and(|d| d.is_finalized()) {
            return Err(LedgerError::Conflict(format!(
                "draw {} must be finalized before draw {draw_id}",
                draw_id - 1
            )));
        }
    }

    let pending = payments::unconfirmed_tickets(tx, draw_id)?;
    if pending > 0 {
        return Err(LedgerError::Conflict(format!(
            "draw {draw_id} still has {pending} unconfirmed tickets"
        )));
    }

    let draw = draws::get(tx, draw_id)?
        .ok_or_else(|| LedgerError::NotFound(format!("draw {draw_id}")))?;
    let tickets_bought = payments::tickets_bought(tx, draw_id)?;
    let sponsor_contribution = payments::sponsor_contribution(tx, draw_id)?;
    let pool = draw
        .bonus_carry
        .checked_add(sponsor_contribution)
        .ok_or_else(|| LedgerError::Invariant(format!("bonus pool of draw {draw_id} overflows")))?;
    let finalized_at = chrono::Utc::now().to_rfc3339();

    let Some(ticket) = winning_ticket(stretched, tickets_bought) else {
        draws::set_bonus_carry(tx, draw_id + 1, pool)?;
        draws::store_outcome(
            tx,
            draw_id,
            &DrawOutcome {
                tickets_bought,
                sponsor_contribution,
                stretched_hash: stretched.to_string(),
                winning_ticket: -1,
                winning_payment_txid: None,
                winning_payment_vout: None,
                winner_registered_address_id: None,
                winner_bonus: None,
                finalized_at,
            },
        )?;
        return Ok(FinalizeOutcome::NoTicketsSold {
            draw_id,
            next_bonus_carry: pool,
        });
    };

    if ticket >= tickets_bought {
        return Err(LedgerError::Invariant(format!(
            "winning ticket {ticket} outside {tickets_bought} tickets"
        )));
    }

    let payment = payments::winning_payment(tx, draw_id, ticket)?.ok_or_else(|| {
        LedgerError::Invariant(format!(
            "no payment covers ticket {ticket} of {tickets_bought} in draw {draw_id}"
        ))
    })?;

    let fraction = schedule.bonus_fraction(draw_id, payment.block_height);
    let split = split_pool(pool, fraction);

    let registered_address_id = match &payment.sending_address {
        Some(address) => addresses::latest_id_for_address(tx, address)?,
        None => None,
    };

    draws::set_bonus_carry(tx, draw_id + 1, split.carry)?;
    draws::store_outcome(
        tx,
        draw_id,
        &DrawOutcome {
            tickets_bought,
            sponsor_contribution,
            stretched_hash: stretched.to_string(),
            winning_ticket: ticket as i64,
            winning_payment_txid: Some(payment.txid.clone()),
            winning_payment_vout: Some(payment.vout),
            winner_registered_address_id: registered_address_id.clone(),
            winner_bonus: Some(split.winner_bonus),
            finalized_at,
        },
    )?;

    Ok(FinalizeOutcome::Winner(WinnerResult {
        draw_id,
        tickets_bought,
        winning_ticket: ticket,
        payment_id: payment.id,
        txid: payment.txid,
        vout: payment.vout,
        amount: payment.amount,
        sending_address: payment.sending_address,
        registered_address_id,
        fraction,
        winner_bonus: split.winner_bonus,
        next_bonus_carry: split.carry,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::queries::payments::{replace_window, NewPayment, PaymentKind};
    use crate::ledger::queries::watermarks;

    const POT: &str = "1Pot";
    const SPONSOR: &str = "1Sponsor";
    const HASH: &str = "00000000000000000ef86b27c174df6a412c0ce43eab1d532034555749294137";

    fn schedule() -> DrawSchedule {
        DrawSchedule::new(383_000, 1000, 6)
    }

    fn stretched_for(ticket: u64) -> String {
        format!("{:064x}", ticket)
    }

    fn lottery(txid: &str, amount: u64, height: Option<u64>, draw_id: u64) -> NewPayment {
        NewPayment {
            txid: txid.to_string(),
            vout: 0,
            block_height: height,
            amount,
            dust: amount < 10_000,
            draw_id,
            sending_address: Some(format!("1From{txid}")),
        }
    }

    fn seeded(tickets: Vec<NewPayment>, sponsor: Vec<NewPayment>, carry: u64) -> LedgerStore {
        let store = LedgerStore::open_memory().unwrap();
        store
            .write_blocking("seed", move |tx| {
                watermarks::ensure(tx, POT, PaymentKind::Lottery, 0)?;
                watermarks::ensure(tx, SPONSOR, PaymentKind::Sponsor, 0)?;
                replace_window(tx, POT, PaymentKind::Lottery, 0, &tickets, "t")?;
                replace_window(tx, SPONSOR, PaymentKind::Sponsor, 0, &sponsor, "t")?;
                draws::ensure_through(tx, 3)?;
                draws::set_bonus_carry(tx, 1, carry)?;
                Ok(())
            })
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_example_winner_and_bonus_split() {
        let store = seeded(
            vec![
                lottery("bb", 700_000, Some(383_399), 1),
                lottery("aa", 300_000, Some(383_400), 1),
            ],
            vec![NewPayment {
                sending_address: None,
                ..lottery("sp", 50, Some(382_000), 1)
            }],
            100,
        );
        // Sponsor row with amount 50 is dust at a 10k threshold; make it count.
        store
            .write_blocking("undust", |tx| {
                tx.execute("UPDATE payments SET dust = 0 WHERE owner = ?1", [SPONSOR])?;
                Ok(())
            })
            .unwrap();

        let engine = SettlementEngine::new(store.clone(), schedule());
        let outcome = engine
            .finalize_draw(1, HASH, &stretched_for(250_000))
            .await
            .unwrap();

        let FinalizeOutcome::Winner(w) = outcome else {
            panic!("expected a winner");
        };
        assert_eq!(w.txid, "aa");
        assert_eq!(w.winning_ticket, 250_000);
        assert_eq!(w.fraction, BonusFraction::new(400, 1000));
        assert_eq!(w.winner_bonus, 60);
        assert_eq!(w.next_bonus_carry, 90);

        let next = store.read_blocking(|c| draws::get(c, 2)).unwrap().unwrap();
        assert_eq!(next.bonus_carry, 90);
        let row = store.read_blocking(|c| draws::get(c, 1)).unwrap().unwrap();
        assert_eq!(row.tickets_bought, 1_000_000);
        assert_eq!(row.sponsor_contribution, 50);
        assert_eq!(row.winning_payment_txid.as_deref(), Some("aa"));
    }

    #[tokio::test]
    async fn test_second_finalize_is_already_finalized_and_unchanged() {
        let store = seeded(vec![lottery("aa", 300_000, Some(383_100), 1)], vec![], 0);
        let engine = SettlementEngine::new(store.clone(), schedule());
        engine.finalize_draw(1, HASH, &stretched_for(5)).await.unwrap();
        let before = store.read_blocking(|c| draws::get(c, 1)).unwrap();

        let err = engine
            .finalize_draw(1, &"11".repeat(32), &stretched_for(7))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::AlreadyFinalized { draw_id: 1 }));
        assert_eq!(store.read_blocking(|c| draws::get(c, 1)).unwrap(), before);
    }

    #[tokio::test]
    async fn test_no_tickets_carries_whole_pool() {
        let store = seeded(vec![], vec![], 1_234);
        let engine = SettlementEngine::new(store.clone(), schedule());
        let outcome = engine.finalize_draw(1, HASH, &stretched_for(1)).await.unwrap();
        assert_eq!(
            outcome,
            FinalizeOutcome::NoTicketsSold {
                draw_id: 1,
                next_bonus_carry: 1_234
            }
        );
        let row = store.read_blocking(|c| draws::get(c, 1)).unwrap().unwrap();
        assert_eq!(row.winning_ticket, Some(-1));
        assert!(row.winning_payment_txid.is_none());
    }

    #[tokio::test]
    async fn test_previous_draw_must_be_final() {
        let store = seeded(vec![], vec![], 0);
        let engine = SettlementEngine::new(store.clone(), schedule());
        let err = engine.finalize_draw(2, HASH, &stretched_for(1)).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
        // The claim was rolled back.
        let row = store.read_blocking(|c| draws::get(c, 2)).unwrap().unwrap();
        assert!(row.block_hash.is_none());
    }

    #[tokio::test]
    async fn test_unconfirmed_tickets_block_finalization() {
        let store = seeded(vec![lottery("aa", 300_000, None, 1)], vec![], 0);
        let engine = SettlementEngine::new(store, schedule());
        let err = engine.finalize_draw(1, HASH, &stretched_for(1)).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_dust_never_wins() {
        let store = seeded(
            vec![lottery("aa", 5_000, Some(383_100), 1), lottery("bb", 20_000, Some(383_100), 1)],
            vec![],
            0,
        );
        let engine = SettlementEngine::new(store, schedule());
        let FinalizeOutcome::Winner(w) = engine.finalize_draw(1, HASH, &stretched_for(0)).await.unwrap() else {
            panic!("expected a winner");
        };
        assert_eq!(w.txid, "bb");
        assert_eq!(w.tickets_bought, 20_000);
    }

    #[tokio::test]
    async fn test_malformed_inputs_rejected_before_io() {
        let engine = SettlementEngine::new(LedgerStore::open_memory().unwrap(), schedule());
        let err = engine.finalize_draw(1, "nothex", &stretched_for(1)).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
        let err = engine.finalize_draw(0, HASH, &stretched_for(1)).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }
}
