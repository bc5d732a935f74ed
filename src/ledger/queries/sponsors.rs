//! Sponsor rows and per-draw sponsor totals.

use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::ledger::{expect_one_row, LedgerResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SponsorRow {
    pub id: u32,
    pub name: String,
    pub url: String,
    pub bitcoin_address: String,
    pub derivation_index: u32,
    pub created: String,
}

/// A sponsor's confirmed non-dust total for one draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SponsorTotal {
    pub sponsor_id: u32,
    pub name: String,
    pub amount: u64,
}

const COLUMNS: &str = "id, name, url, bitcoin_address, derivation_index, created";

fn from_row(row: &Row<'_>) -> rusqlite::Result<SponsorRow> {
    Ok(SponsorRow {
        id: row.get::<_, i64>(0)? as u32,
        name: row.get(1)?,
        url: row.get(2)?,
        bitcoin_address: row.get(3)?,
        derivation_index: row.get::<_, i64>(4)? as u32,
        created: row.get(5)?,
    })
}

/// Insert a sponsor. The id equals its derivation index.
pub fn insert(conn: &Connection, row: &SponsorRow) -> LedgerResult<()> {
    let inserted = conn.execute(
        &format!("INSERT INTO sponsors ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
        rusqlite::params![
            row.id as i64,
            row.name,
            row.url,
            row.bitcoin_address,
            row.derivation_index as i64,
            row.created,
        ],
    )?;
    expect_one_row(inserted, "insert sponsor")
}

pub fn get_by_address(conn: &Connection, address: &str) -> LedgerResult<Option<SponsorRow>> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM sponsors WHERE bitcoin_address = ?1"),
            [address],
            from_row,
        )
        .optional()?)
}

pub fn list(conn: &Connection) -> LedgerResult<Vec<SponsorRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM sponsors ORDER BY id"))?;
    let rows = stmt.query_map([], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Confirmed non-dust sponsor totals for a draw, largest first.
pub fn totals_for_draw(conn: &Connection, draw_id: u64, limit: u32) -> LedgerResult<Vec<SponsorTotal>> {
    let mut stmt = conn.prepare(
        "SELECT sponsors.id, sponsors.name, SUM(payments.amount)
         FROM sponsors
         JOIN payments ON payments.owner = sponsors.bitcoin_address
         WHERE payments.kind = 'sponsor' AND payments.draw_id = ?1
           AND payments.dust = 0 AND payments.block_height IS NOT NULL
         GROUP BY sponsors.id
         ORDER BY SUM(payments.amount) DESC, sponsors.id
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(rusqlite::params![draw_id as i64, limit as i64], |row| {
        Ok(SponsorTotal {
            sponsor_id: row.get::<_, i64>(0)? as u32,
            name: row.get(1)?,
            amount: row.get::<_, i64>(2)? as u64,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::queries::payments::{replace_window, NewPayment, PaymentKind};
    use crate::ledger::queries::watermarks;
    use crate::ledger::LedgerStore;

    fn sponsor(id: u32, address: &str) -> SponsorRow {
        SponsorRow {
            id,
            name: format!("Sponsor {id}"),
            url: "https://example.com".to_string(),
            bitcoin_address: address.to_string(),
            derivation_index: id,
            created: "2015-11-01T00:00:00Z".to_string(),
        }
    }

    fn payment(txid: &str, amount: u64, height: Option<u64>, dust: bool) -> NewPayment {
        NewPayment {
            txid: txid.to_string(),
            vout: 0,
            block_height: height,
            amount,
            dust,
            draw_id: 2,
            sending_address: None,
        }
    }

    #[test]
    fn test_totals_count_confirmed_non_dust_only() {
        let store = LedgerStore::open_memory().unwrap();
        store
            .read_blocking(|c| {
                for (id, address) in [(1, "1SponsorA"), (2, "1SponsorB")] {
                    watermarks::ensure(c, address, PaymentKind::Sponsor, 0)?;
                    insert(c, &sponsor(id, address))?;
                }
                replace_window(
                    c,
                    "1SponsorA",
                    PaymentKind::Sponsor,
                    0,
                    &[
                        payment("a1", 50_000, Some(10), false),
                        payment("a2", 1_000, Some(10), true),
                        payment("a3", 70_000, None, false),
                    ],
                    "t",
                )?;
                replace_window(
                    c,
                    "1SponsorB",
                    PaymentKind::Sponsor,
                    0,
                    &[payment("b1", 90_000, Some(11), false)],
                    "t",
                )?;

                let totals = totals_for_draw(c, 2, 10)?;
                assert_eq!(totals.len(), 2);
                assert_eq!((totals[0].sponsor_id, totals[0].amount), (2, 90_000));
                assert_eq!((totals[1].sponsor_id, totals[1].amount), (1, 50_000));

                assert_eq!(get_by_address(c, "1SponsorB")?.unwrap().id, 2);
                assert_eq!(list(c)?.len(), 2);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_sponsor_requires_tracked_address() {
        let store = LedgerStore::open_memory().unwrap();
        let result = store.read_blocking(|c| insert(c, &sponsor(1, "1Untracked")));
        assert!(result.is_err());
    }
}
