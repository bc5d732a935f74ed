//! Draw rows.

use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::ledger::{expect_one_row, LedgerError, LedgerResult};

/// A stored draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrawRow {
    pub id: u64,
    pub tickets_bought: u64,
    pub sponsor_contribution: u64,
    pub bonus_carry: u64,
    pub block_hash: Option<String>,
    pub stretched_hash: Option<String>,
    /// `-1` when the draw was finalized with no tickets.
    pub winning_ticket: Option<i64>,
    /// The winning payment by chain identity; payment row ids do not
    /// survive a window replace.
    pub winning_payment_txid: Option<String>,
    pub winning_payment_vout: Option<u32>,
    pub winner_registered_address_id: Option<String>,
    pub winner_bonus: Option<u64>,
    pub winner_txid: Option<String>,
    pub finalized_at: Option<String>,
}

impl DrawRow {
    pub fn is_finalized(&self) -> bool {
        self.block_hash.is_some()
    }
}

/// Values written when a draw is finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawOutcome {
    pub tickets_bought: u64,
    pub sponsor_contribution: u64,
    pub stretched_hash: String,
    pub winning_ticket: i64,
    pub winning_payment_txid: Option<String>,
    pub winning_payment_vout: Option<u32>,
    pub winner_registered_address_id: Option<String>,
    pub winner_bonus: Option<u64>,
    pub finalized_at: String,
}

const COLUMNS: &str = "id, tickets_bought, sponsor_contribution, bonus_carry, block_hash, \
    stretched_hash, winning_ticket, winning_payment_txid, winning_payment_vout, \
    winner_registered_address_id, winner_bonus, winner_txid, finalized_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<DrawRow> {
    Ok(DrawRow {
        id: row.get::<_, i64>(0)? as u64,
        tickets_bought: row.get::<_, i64>(1)? as u64,
        sponsor_contribution: row.get::<_, i64>(2)? as u64,
        bonus_carry: row.get::<_, i64>(3)? as u64,
        block_hash: row.get(4)?,
        stretched_hash: row.get(5)?,
        winning_ticket: row.get(6)?,
        winning_payment_txid: row.get(7)?,
        winning_payment_vout: row.get::<_, Option<i64>>(8)?.map(|v| v as u32),
        winner_registered_address_id: row.get(9)?,
        winner_bonus: row.get::<_, Option<i64>>(10)?.map(|v| v as u64),
        winner_txid: row.get(11)?,
        finalized_at: row.get(12)?,
    })
}

/// Create draw rows `1..=last_id` that do not exist yet.
pub fn ensure_through(conn: &Connection, last_id: u64) -> LedgerResult<()> {
    let existing: i64 = conn.query_row("SELECT COALESCE(MAX(id), 0) FROM draws", [], |r| r.get(0))?;
    let mut insert = conn.prepare_cached("INSERT OR IGNORE INTO draws (id) VALUES (?1)")?;
    for id in (existing as u64 + 1)..=last_id {
        insert.execute([id as i64])?;
    }
    Ok(())
}

pub fn get(conn: &Connection, id: u64) -> LedgerResult<Option<DrawRow>> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM draws WHERE id = ?1"),
            [id as i64],
            from_row,
        )
        .optional()?)
}

/// Highest finalized draw id, 0 when none.
pub fn last_finalized(conn: &Connection) -> LedgerResult<u64> {
    let id: i64 = conn.query_row(
        "SELECT COALESCE(MAX(id), 0) FROM draws WHERE block_hash IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    Ok(id as u64)
}

/// Write-once claim of the seeding block hash.
///
/// Zero affected rows means either the draw does not exist or somebody
/// finalized it first.
pub fn claim_block_hash(conn: &Connection, id: u64, block_hash: &str) -> LedgerResult<()> {
    let updated = conn.execute(
        "UPDATE draws SET block_hash = ?1 WHERE id = ?2 AND block_hash IS NULL",
        rusqlite::params![block_hash, id as i64],
    )?;
    if updated == 1 {
        return Ok(());
    }
    match get(conn, id)? {
        Some(_) => Err(LedgerError::AlreadyFinalized { draw_id: id }),
        None => Err(LedgerError::NotFound(format!("draw {id}"))),
    }
}

/// Store the computed outcome of a claimed draw.
pub fn store_outcome(conn: &Connection, id: u64, outcome: &DrawOutcome) -> LedgerResult<()> {
    let updated = conn.execute(
        "UPDATE draws SET
            tickets_bought = ?1, sponsor_contribution = ?2, stretched_hash = ?3,
            winning_ticket = ?4, winning_payment_txid = ?5, winning_payment_vout = ?6,
            winner_registered_address_id = ?7, winner_bonus = ?8, finalized_at = ?9
         WHERE id = ?10 AND block_hash IS NOT NULL",
        rusqlite::params![
            outcome.tickets_bought as i64,
            outcome.sponsor_contribution as i64,
            outcome.stretched_hash,
            outcome.winning_ticket,
            outcome.winning_payment_txid,
            outcome.winning_payment_vout.map(|v| v as i64),
            outcome.winner_registered_address_id,
            outcome.winner_bonus.map(|v| v as i64),
            outcome.finalized_at,
            id as i64,
        ],
    )?;
    expect_one_row(updated, "store draw outcome")
}

/// Set the bonus carried into `id`, creating the row if needed.
pub fn set_bonus_carry(conn: &Connection, id: u64, carry: u64) -> LedgerResult<()> {
    conn.execute("INSERT OR IGNORE INTO draws (id) VALUES (?1)", [id as i64])?;
    let updated = conn.execute(
        "UPDATE draws SET bonus_carry = ?1 WHERE id = ?2 AND block_hash IS NULL",
        rusqlite::params![carry as i64, id as i64],
    )?;
    if updated != 1 {
        return Err(LedgerError::Conflict(format!(
            "draw {id} finalized before its bonus carry was set"
        )));
    }
    Ok(())
}

/// Record the payout transaction. Write-once.
pub fn set_winner_txid(conn: &Connection, id: u64, txid: &str) -> LedgerResult<()> {
    let updated = conn.execute(
        "UPDATE draws SET winner_txid = ?1
         WHERE id = ?2 AND winner_txid IS NULL AND block_hash IS NOT NULL AND winning_payment_txid IS NOT NULL",
        rusqlite::params![txid, id as i64],
    )?;
    if updated == 1 {
        return Ok(());
    }
    match get(conn, id)? {
        None => Err(LedgerError::NotFound(format!("draw {id}"))),
        Some(draw) if draw.winner_txid.is_some() => Err(LedgerError::Conflict(format!(
            "draw {id} already has a winner txid"
        ))),
        Some(_) => Err(LedgerError::Conflict(format!(
            "draw {id} has no finalized winner to pay"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerStore;

    #[test]
    fn test_ensure_through_is_incremental() {
        let store = LedgerStore::open_memory().unwrap();
        store
            .read_blocking(|c| {
                ensure_through(c, 3)?;
                ensure_through(c, 2)?;
                ensure_through(c, 5)?;
                let count: i64 = c.query_row("SELECT COUNT(*) FROM draws", [], |r| r.get(0))?;
                assert_eq!(count, 5);
                assert_eq!(get(c, 5)?.unwrap().bonus_carry, 0);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_block_hash_is_write_once() {
        let store = LedgerStore::open_memory().unwrap();
        store
            .read_blocking(|c| {
                ensure_through(c, 1)?;
                claim_block_hash(c, 1, "aa")?;
                assert!(matches!(
                    claim_block_hash(c, 1, "bb"),
                    Err(LedgerError::AlreadyFinalized { draw_id: 1 })
                ));
                assert_eq!(get(c, 1)?.unwrap().block_hash.as_deref(), Some("aa"));
                assert!(matches!(claim_block_hash(c, 9, "bb"), Err(LedgerError::NotFound(_))));
                assert_eq!(last_finalized(c)?, 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_carry_into_finalized_draw_is_conflict() {
        let store = LedgerStore::open_memory().unwrap();
        store
            .read_blocking(|c| {
                set_bonus_carry(c, 2, 90)?;
                assert_eq!(get(c, 2)?.unwrap().bonus_carry, 90);
                claim_block_hash(c, 2, "aa")?;
                assert!(matches!(set_bonus_carry(c, 2, 10), Err(LedgerError::Conflict(_))));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_winner_txid_requires_winner_and_is_write_once() {
        let store = LedgerStore::open_memory().unwrap();
        store
            .read_blocking(|c| {
                ensure_through(c, 1)?;
                assert!(matches!(set_winner_txid(c, 1, "pay"), Err(LedgerError::Conflict(_))));

                claim_block_hash(c, 1, "aa")?;
                c.execute("UPDATE draws SET winning_payment_txid = 'aa', winning_payment_vout = 0 WHERE id = 1", [])?;
                set_winner_txid(c, 1, "pay")?;
                assert!(matches!(set_winner_txid(c, 1, "again"), Err(LedgerError::Conflict(_))));
                assert_eq!(get(c, 1)?.unwrap().winner_txid.as_deref(), Some("pay"));
                Ok(())
            })
            .unwrap();
    }
}
