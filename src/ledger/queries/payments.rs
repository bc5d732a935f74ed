//! Payment rows: lottery tickets and sponsor contributions.

use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::ledger::{expect_one_row, LedgerError, LedgerResult};

/// Which kind of tracked address a payment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Lottery,
    Sponsor,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Lottery => "lottery",
            PaymentKind::Sponsor => "sponsor",
        }
    }

    fn parse(s: &str) -> LedgerResult<Self> {
        match s {
            "lottery" => Ok(PaymentKind::Lottery),
            "sponsor" => Ok(PaymentKind::Sponsor),
            other => Err(LedgerError::Invariant(format!("unknown payment kind '{other}'"))),
        }
    }
}

/// A payment about to be written by a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub txid: String,
    pub vout: u32,
    pub block_height: Option<u64>,
    pub amount: u64,
    pub dust: bool,
    pub draw_id: u64,
    pub sending_address: Option<String>,
}

/// A stored payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRow {
    pub id: i64,
    pub owner: String,
    pub kind: PaymentKind,
    pub txid: String,
    pub vout: u32,
    pub block_height: Option<u64>,
    pub amount: u64,
    pub dust: bool,
    pub draw_id: u64,
    pub sending_address: Option<String>,
}

const COLUMNS: &str =
    "id, owner, kind, txid, vout, block_height, amount, dust, draw_id, sending_address";

fn from_row(row: &Row<'_>) -> rusqlite::Result<(PaymentRow, String)> {
    let kind: String = row.get(2)?;
    let block_height: Option<i64> = row.get(5)?;
    Ok((
        PaymentRow {
            id: row.get(0)?,
            owner: row.get(1)?,
            kind: PaymentKind::Lottery,
            txid: row.get(3)?,
            vout: row.get::<_, i64>(4)? as u32,
            block_height: block_height.map(|h| h as u64),
            amount: row.get::<_, i64>(6)? as u64,
            dust: row.get(7)?,
            draw_id: row.get::<_, i64>(8)? as u64,
            sending_address: row.get(9)?,
        },
        kind,
    ))
}

fn collect(rows: impl Iterator<Item = rusqlite::Result<(PaymentRow, String)>>) -> LedgerResult<Vec<PaymentRow>> {
    rows.map(|r| {
        let (mut payment, kind) = r?;
        payment.kind = PaymentKind::parse(&kind)?;
        Ok(payment)
    })
    .collect()
}

/// Replace the payments of `owner` at or above `floor`, plus every
/// unconfirmed row, with `payments`.
///
/// Must run inside the same unit of work as the watermark advance.
pub fn replace_window(
    conn: &Connection,
    owner: &str,
    kind: PaymentKind,
    floor: u64,
    payments: &[NewPayment],
    created: &str,
) -> LedgerResult<usize> {
    let deleted = conn.execute(
        "DELETE FROM payments WHERE owner = ?1 AND (block_height IS NULL OR block_height >= ?2)",
        rusqlite::params![owner, floor as i64],
    )?;

    let mut insert = conn.prepare_cached(
        "INSERT INTO payments
            (owner, kind, txid, vout, block_height, amount, dust, draw_id, sending_address, created)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;

    for payment in payments {
        if payment.amount > i64::MAX as u64 {
            return Err(LedgerError::Invariant(format!(
                "payment {}:{} amount {} out of range",
                payment.txid, payment.vout, payment.amount
            )));
        }
        let inserted = insert.execute(rusqlite::params![
            owner,
            kind.as_str(),
            payment.txid,
            payment.vout as i64,
            payment.block_height.map(|h| h as i64),
            payment.amount as i64,
            payment.dust,
            payment.draw_id as i64,
            payment.sending_address,
            created,
        ])?;
        expect_one_row(inserted, "insert payment")?;
    }

    Ok(deleted)
}

/// Every payment recorded for `owner`, ordered by (txid, vout).
pub fn for_owner(conn: &Connection, owner: &str) -> LedgerResult<Vec<PaymentRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM payments WHERE owner = ?1 ORDER BY txid, vout"
    ))?;
    let rows = stmt.query_map([owner], from_row)?;
    collect(rows)
}

/// Non-dust lottery payments of a draw in ticket order.
pub fn tickets(conn: &Connection, draw_id: u64) -> LedgerResult<Vec<PaymentRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM payments
         WHERE kind = 'lottery' AND draw_id = ?1 AND dust = 0
         ORDER BY txid, vout"
    ))?;
    let rows = stmt.query_map([draw_id as i64], from_row)?;
    collect(rows)
}

/// Sum of non-dust lottery amounts in a draw.
pub fn tickets_bought(conn: &Connection, draw_id: u64) -> LedgerResult<u64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM payments
         WHERE kind = 'lottery' AND draw_id = ?1 AND dust = 0",
        [draw_id as i64],
        |row| row.get(0),
    )?;
    if total < 0 {
        return Err(LedgerError::Invariant(format!("negative ticket total {total}")));
    }
    Ok(total as u64)
}

/// Lottery payments of a draw still waiting for a block.
pub fn unconfirmed_tickets(conn: &Connection, draw_id: u64) -> LedgerResult<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM payments
         WHERE kind = 'lottery' AND draw_id = ?1 AND dust = 0 AND block_height IS NULL",
        [draw_id as i64],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// The payment whose running-total range `[total - amount, total)` contains `ticket`.
pub fn winning_payment(conn: &Connection, draw_id: u64, ticket: u64) -> LedgerResult<Option<PaymentRow>> {
    let sql = format!(
        "WITH ranked AS (
            SELECT {COLUMNS}, SUM(amount) OVER (ORDER BY txid, vout) AS running_total
            FROM payments
            WHERE kind = 'lottery' AND draw_id = ?1 AND dust = 0
         )
         SELECT {COLUMNS} FROM ranked
         WHERE ?2 >= running_total - amount AND ?2 < running_total"
    );
    let found = conn
        .query_row(&sql, rusqlite::params![draw_id as i64, ticket as i64], from_row)
        .optional()?;
    match found {
        Some((mut payment, kind)) => {
            payment.kind = PaymentKind::parse(&kind)?;
            Ok(Some(payment))
        }
        None => Ok(None),
    }
}

/// Confirmed non-dust sponsor money bucketed into `draw_id`.
pub fn sponsor_contribution(conn: &Connection, draw_id: u64) -> LedgerResult<u64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM payments
         WHERE kind = 'sponsor' AND draw_id = ?1 AND dust = 0 AND block_height IS NOT NULL",
        [draw_id as i64],
        |row| row.get(0),
    )?;
    Ok(total as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::queries::watermarks;
    use crate::ledger::LedgerStore;

    fn ticket(txid: &str, vout: u32, amount: u64, height: Option<u64>) -> NewPayment {
        NewPayment {
            txid: txid.to_string(),
            vout,
            block_height: height,
            amount,
            dust: amount < 10_000,
            draw_id: 1,
            sending_address: Some("1Sender".to_string()),
        }
    }

    fn store_with(payments: &[NewPayment]) -> LedgerStore {
        let store = LedgerStore::open_memory().unwrap();
        let payments = payments.to_vec();
        store
            .write_blocking("test", move |tx| {
                watermarks::ensure(tx, "1Pot", PaymentKind::Lottery, 0)?;
                replace_window(tx, "1Pot", PaymentKind::Lottery, 0, &payments, "2015-11-01T00:00:00Z")
            })
            .unwrap();
        store
    }

    #[test]
    fn test_ticket_sum_excludes_dust() {
        let store = store_with(&[
            ticket("bb", 0, 700_000, Some(383_010)),
            ticket("aa", 0, 300_000, Some(383_005)),
            ticket("cc", 0, 5_000, Some(383_005)),
        ]);
        store
            .read_blocking(|c| {
                assert_eq!(tickets_bought(c, 1)?, 1_000_000);
                let ordered: Vec<_> = tickets(c, 1)?.into_iter().map(|p| p.txid).collect();
                assert_eq!(ordered, vec!["aa", "bb"]);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_winning_payment_ranges() {
        let store = store_with(&[
            ticket("bb", 0, 700_000, Some(383_010)),
            ticket("aa", 0, 300_000, Some(383_005)),
        ]);
        store
            .read_blocking(|c| {
                assert_eq!(winning_payment(c, 1, 0)?.unwrap().txid, "aa");
                assert_eq!(winning_payment(c, 1, 299_999)?.unwrap().txid, "aa");
                assert_eq!(winning_payment(c, 1, 300_000)?.unwrap().txid, "bb");
                assert_eq!(winning_payment(c, 1, 999_999)?.unwrap().txid, "bb");
                assert!(winning_payment(c, 1, 1_000_000)?.is_none());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_replace_window_keeps_rows_below_floor() {
        let store = store_with(&[
            ticket("old", 0, 50_000, Some(100)),
            ticket("new", 0, 50_000, Some(200)),
            ticket("mempool", 0, 50_000, None),
        ]);
        let deleted = store
            .write_blocking("test", |tx| {
                replace_window(tx, "1Pot", PaymentKind::Lottery, 150, &[], "2015-11-01T00:00:00Z")
            })
            .unwrap();
        assert_eq!(deleted, 2);

        let remaining = store.read_blocking(|c| for_owner(c, "1Pot")).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].txid, "old");
    }

    #[test]
    fn test_duplicate_output_fails_whole_unit() {
        let store = LedgerStore::open_memory().unwrap();
        let result = store.write_blocking("test", |tx| {
            watermarks::ensure(tx, "1Pot", PaymentKind::Lottery, 0)?;
            let dup = ticket("aa", 0, 20_000, Some(1));
            replace_window(tx, "1Pot", PaymentKind::Lottery, 0, &[dup.clone(), dup], "t")
        });
        assert!(result.is_err());
        let rows = store.read_blocking(|c| for_owner(c, "1Pot")).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_unknown_owner_rejected_by_foreign_key() {
        let store = LedgerStore::open_memory().unwrap();
        let result = store.write_blocking("test", |tx| {
            replace_window(tx, "1Ghost", PaymentKind::Lottery, 0, &[ticket("aa", 0, 20_000, None)], "t")
        });
        assert!(result.is_err());
    }
}
