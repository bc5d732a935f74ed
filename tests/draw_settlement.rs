//! Draw settlement end to end: block processing, bonus carry, ordering,
//! payout recording and public verification.

mod common;

use common::{pay, txid, Harness, HASH_112, HASH_122, POT, WIN};
use pevpot::ledger::queries::{draws, payments};
use pevpot::settlement::{
    draw_report, select_winner, verify_report, winning_ticket, BonusFraction, DrawState, FinalizeOutcome,
};
use pevpot::{ErrorKind, SettlementError};

/// Sponsors put 150_000 into draw 2, draw 1 sells nothing and draw 2 has a
/// single ticket confirmed at the fourth block of its window. Returns the
/// id of the forwarding registration that bought the ticket.
async fn two_draws(harness: &Harness) -> String {
    let sponsor = harness
        .services
        .registry
        .create_sponsor("Acme Mining", "https://acme.example", chrono::Utc::now())
        .await
        .unwrap();
    harness
        .chain
        .add_transaction(pay(1, &sponsor.bitcoin_address, 100_000, Some(103), "1Acme"));
    harness
        .chain
        .add_transaction(pay(2, &sponsor.bitcoin_address, 50_000, Some(106), "1Acme"));

    let forwarding = harness
        .services
        .registry
        .create_forwarding_address("alice", WIN, chrono::Utc::now())
        .await
        .unwrap();
    harness
        .chain
        .add_transaction(pay(3, POT, 20_000, Some(114), &forwarding.bitcoin_address));

    harness.chain.set_block_hash(112, HASH_112);
    harness.chain.set_block_hash(122, HASH_122);
    harness.chain.set_height(122);

    let sponsors = harness.services.scheduler.reconcile_sponsors().await.unwrap();
    assert!(sponsors.iter().all(|r| r.is_ok()));
    forwarding.id
}

async fn draw(harness: &Harness, id: u64) -> draws::DrawRow {
    harness
        .ledger()
        .read(move |c| draws::get(c, id))
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_block_settles_every_seeded_draw() {
    let harness = Harness::new();
    let registration_id = two_draws(&harness).await;

    let report = harness.services.scheduler.process_block(Some(122)).await.unwrap();

    assert_eq!(report.reconcile.new_watermark, 122);
    assert_eq!(report.finalized.len(), 2);
    assert_eq!(
        report.finalized[0],
        FinalizeOutcome::NoTicketsSold {
            draw_id: 1,
            next_bonus_carry: 0
        }
    );

    let FinalizeOutcome::Winner(winner) = &report.finalized[1] else {
        panic!("draw 2 should have a winner");
    };
    assert_eq!(winner.draw_id, 2);
    assert_eq!(winner.tickets_bought, 20_000);
    assert_eq!(winner.txid, txid(3));
    assert_eq!(winner.fraction, BonusFraction::new(4, 10));
    assert_eq!(winner.winner_bonus, 60_000);
    assert_eq!(winner.next_bonus_carry, 90_000);
    assert_eq!(winner.registered_address_id.as_deref(), Some(registration_id.as_str()));

    assert_eq!(draw(&harness, 3).await.bonus_carry, 90_000);
    assert_eq!(draw(&harness, 2).await.sponsor_contribution, 150_000);
}

#[tokio::test]
async fn test_second_finalize_is_rejected() {
    let harness = Harness::new();
    two_draws(&harness).await;
    harness.services.scheduler.process_block(Some(122)).await.unwrap();

    let err = harness.services.scheduler.finalize_draw(1).await.unwrap_err();

    assert!(matches!(err, SettlementError::AlreadyFinalized { draw_id: 1 }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(draw(&harness, 1).await.block_hash.as_deref(), Some(HASH_112));
}

#[tokio::test]
async fn test_draws_finalize_in_order() {
    let harness = Harness::new();
    two_draws(&harness).await;
    harness.services.scheduler.reconcile_pot().await.unwrap();

    let err = harness.services.scheduler.finalize_draw(2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(draw(&harness, 2).await.block_hash, None);

    harness.services.scheduler.finalize_draw(1).await.unwrap();
    let outcome = harness.services.scheduler.finalize_draw(2).await.unwrap();
    assert_eq!(outcome.draw_id(), 2);
    assert_eq!(draw(&harness, 2).await.block_hash.as_deref(), Some(HASH_122));
}

#[tokio::test]
async fn test_finalize_before_scan_is_a_conflict() {
    let harness = Harness::new();
    harness.chain.set_block_hash(112, HASH_112);

    let err = harness.services.scheduler.finalize_draw(1).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_winner_is_reproducible_from_public_data() {
    let harness = Harness::new();
    harness.chain.add_transaction(pay(10, POT, 30_000, Some(103), "1Alice"));
    harness.chain.add_transaction(pay(11, POT, 45_000, Some(104), "1Bob"));
    harness.chain.add_transaction(pay(12, POT, 25_000, Some(109), "1Carol"));
    harness.chain.add_transaction(pay(13, POT, 700, Some(109), "1Dust"));
    harness.chain.set_block_hash(112, HASH_112);
    harness.chain.set_height(112);

    harness.services.scheduler.process_block(None).await.unwrap();

    let services = &harness.services;
    let report = draw_report(&services.ledger, &services.schedule, POT, 1).await.unwrap();
    assert_eq!(report.state, DrawState::Finalized);
    assert_eq!(report.tickets_bought, 100_000);
    assert_eq!(report.tickets.len(), 3);

    let stretched = report.stretched_hash.clone().unwrap();
    let ticket = winning_ticket(&stretched, report.tickets_bought).unwrap();
    let winner = select_winner(&report.tickets, ticket).unwrap();
    assert_eq!(report.winning_ticket, Some(ticket as i64));
    assert_eq!(report.winning_txid.as_deref(), Some(winner.txid.as_str()));

    let stretcher = services.scheduler.processor().stretcher();
    let verification = verify_report(&report, stretcher).unwrap();
    assert!(verification.is_valid());

    let mut tampered = report.clone();
    tampered.block_hash = Some(HASH_122.to_string());
    assert!(!verify_report(&tampered, stretcher).unwrap().is_valid());
}

#[tokio::test]
async fn test_winner_txid_marks_draw_paid_once() {
    let harness = Harness::new();
    two_draws(&harness).await;
    harness.services.scheduler.process_block(Some(122)).await.unwrap();

    harness
        .services
        .scheduler
        .record_winner_txid(2, &txid(99))
        .await
        .unwrap();
    assert_eq!(DrawState::of(&draw(&harness, 2).await), DrawState::Paid);

    let again = harness
        .services
        .scheduler
        .record_winner_txid(2, &txid(98))
        .await
        .unwrap_err();
    assert_eq!(again.kind(), ErrorKind::Conflict);

    // Draw 1 sold nothing, so there is nobody to pay.
    let empty = harness
        .services
        .scheduler
        .record_winner_txid(1, &txid(97))
        .await
        .unwrap_err();
    assert_eq!(empty.kind(), ErrorKind::Conflict);

    let malformed = harness
        .services
        .scheduler
        .record_winner_txid(2, "not-a-txid")
        .await
        .unwrap_err();
    assert_eq!(malformed.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_winner_survives_window_replace() {
    let harness = Harness::new();
    harness.chain.add_transaction(pay(20, POT, 40_000, Some(110), "1Alice"));
    harness.chain.set_block_hash(112, HASH_112);
    harness.chain.set_height(112);
    harness.services.scheduler.process_block(None).await.unwrap();

    let ids_before: Vec<i64> = harness
        .ledger()
        .read(|c| payments::for_owner(c, POT))
        .await
        .unwrap()
        .iter()
        .map(|p| p.id)
        .collect();

    // The next scan reaches back over height 110 and re-inserts its payment.
    harness.chain.set_height(115);
    harness.services.scheduler.reconcile_pot().await.unwrap();
    let rows = harness.ledger().read(|c| payments::for_owner(c, POT)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_ne!(vec![rows[0].id], ids_before);

    let row = draw(&harness, 1).await;
    assert_eq!(row.winning_payment_txid.as_deref(), Some(txid(20).as_str()));
    assert_eq!(row.winning_payment_vout, Some(0));

    let services = &harness.services;
    let report = draw_report(&services.ledger, &services.schedule, POT, 1).await.unwrap();
    assert!(verify_report(&report, services.scheduler.processor().stretcher())
        .unwrap()
        .is_valid());
    services.scheduler.record_winner_txid(1, &txid(99)).await.unwrap();
}
