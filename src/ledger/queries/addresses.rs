//! Registered payout addresses and forwarding deposit addresses.

use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::ledger::{expect_one_row, LedgerResult};

/// Upper bound on the forwarding check interval (30 days).
pub const MAX_CHECK_INTERVAL_SECS: i64 = 30 * 24 * 60 * 60;

/// A stored registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredAddressRow {
    pub id: String,
    pub bitcoin_address: String,
    pub message: String,
    pub signature: String,
    pub forwarding_index: Option<u32>,
    /// Unix seconds of the last forwarding check.
    pub forwarding_last_check: Option<i64>,
    pub forwarding_next_check_secs: Option<i64>,
    pub created: String,
}

impl RegisteredAddressRow {
    pub fn is_forwarding(&self) -> bool {
        self.forwarding_index.is_some()
    }
}

/// Forwarding schedule parameters for one check outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleUpdate {
    pub forwarded: bool,
    pub now: i64,
    pub base_interval_secs: i64,
    pub multiplier: i64,
}

const COLUMNS: &str = "id, bitcoin_address, message, signature, forwarding_index, \
    forwarding_last_check, forwarding_next_check_secs, created";

fn from_row(row: &Row<'_>) -> rusqlite::Result<RegisteredAddressRow> {
    Ok(RegisteredAddressRow {
        id: row.get(0)?,
        bitcoin_address: row.get(1)?,
        message: row.get(2)?,
        signature: row.get(3)?,
        forwarding_index: row.get::<_, Option<i64>>(4)?.map(|v| v as u32),
        forwarding_last_check: row.get(5)?,
        forwarding_next_check_secs: row.get(6)?,
        created: row.get(7)?,
    })
}

/// Insert a self-signed registration.
pub fn insert_registration(conn: &Connection, row: &RegisteredAddressRow) -> LedgerResult<()> {
    let inserted = conn.execute(
        &format!("INSERT INTO registered_addresses ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
        rusqlite::params![
            row.id,
            row.bitcoin_address,
            row.message,
            row.signature,
            row.forwarding_index.map(|v| v as i64),
            row.forwarding_last_check,
            row.forwarding_next_check_secs,
            row.created,
        ],
    )?;
    expect_one_row(inserted, "insert registered address")
}

pub fn get(conn: &Connection, id: &str) -> LedgerResult<Option<RegisteredAddressRow>> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM registered_addresses WHERE id = ?1"),
            [id],
            from_row,
        )
        .optional()?)
}

pub fn get_by_forwarding_index(conn: &Connection, index: u32) -> LedgerResult<Option<RegisteredAddressRow>> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM registered_addresses WHERE forwarding_index = ?1"),
            [index as i64],
            from_row,
        )
        .optional()?)
}

/// Forwarding registration by its deposit address.
pub fn get_forwarding_by_address(conn: &Connection, address: &str) -> LedgerResult<Option<RegisteredAddressRow>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM registered_addresses
                 WHERE bitcoin_address = ?1 AND forwarding_index IS NOT NULL"
            ),
            [address],
            from_row,
        )
        .optional()?)
}

/// Newest registration id for an address, used to attribute a winner.
pub fn latest_id_for_address(conn: &Connection, address: &str) -> LedgerResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM registered_addresses WHERE bitcoin_address = ?1
             ORDER BY created DESC LIMIT 1",
            [address],
            |row| row.get(0),
        )
        .optional()?)
}

/// Forwarding indices whose next check is due at `now`, earliest first.
pub fn due_forwarding(conn: &Connection, now: i64, limit: u32) -> LedgerResult<Vec<u32>> {
    let mut stmt = conn.prepare(
        "SELECT forwarding_index FROM registered_addresses
         WHERE forwarding_index IS NOT NULL
           AND ?1 >= forwarding_last_check + forwarding_next_check_secs
         ORDER BY forwarding_last_check + forwarding_next_check_secs ASC, forwarding_index ASC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(rusqlite::params![now, limit as i64], |row| row.get::<_, i64>(0))?;
    Ok(rows
        .map(|r| r.map(|v| v as u32))
        .collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Apply a completed check to the schedule.
///
/// Forwarded resets to the base interval. Otherwise the interval is kept
/// while the check was early, and multiplied once it was due. SQLite
/// evaluates every SET expression against the old row.
pub fn update_schedule(conn: &Connection, index: u32, update: ScheduleUpdate) -> LedgerResult<()> {
    let updated = conn.execute(
        "UPDATE registered_addresses SET
            forwarding_next_check_secs = CASE
                WHEN ?1 THEN ?2
                WHEN ?3 < forwarding_last_check + forwarding_next_check_secs THEN forwarding_next_check_secs
                ELSE MIN(forwarding_next_check_secs * ?4, ?5)
            END,
            forwarding_last_check = ?3
         WHERE forwarding_index = ?6",
        rusqlite::params![
            update.forwarded,
            update.base_interval_secs,
            update.now,
            update.multiplier,
            MAX_CHECK_INTERVAL_SECS,
            index as i64,
        ],
    )?;
    expect_one_row(updated, "update forwarding schedule")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerStore;

    fn forwarding(id: &str, index: u32, last: i64, next: i64) -> RegisteredAddressRow {
        RegisteredAddressRow {
            id: id.to_string(),
            bitcoin_address: format!("1Fwd{index}"),
            message: "{}".to_string(),
            signature: "sig".to_string(),
            forwarding_index: Some(index),
            forwarding_last_check: Some(last),
            forwarding_next_check_secs: Some(next),
            created: format!("2015-11-0{index}T00:00:00Z"),
        }
    }

    fn update(forwarded: bool, now: i64) -> ScheduleUpdate {
        ScheduleUpdate {
            forwarded,
            now,
            base_interval_secs: 600,
            multiplier: 3,
        }
    }

    #[test]
    fn test_due_ordering_and_limit() {
        let store = LedgerStore::open_memory().unwrap();
        store
            .read_blocking(|c| {
                insert_registration(c, &forwarding("a", 1, 1000, 600))?;
                insert_registration(c, &forwarding("b", 2, 900, 600))?;
                insert_registration(c, &forwarding("c", 3, 5000, 600))?;
                assert_eq!(due_forwarding(c, 2000, 10)?, vec![2, 1]);
                assert_eq!(due_forwarding(c, 2000, 1)?, vec![2]);
                assert!(due_forwarding(c, 1000, 10)?.is_empty());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_schedule_transitions() {
        let store = LedgerStore::open_memory().unwrap();
        store
            .read_blocking(|c| {
                insert_registration(c, &forwarding("a", 1, 1000, 600))?;

                // Due no-op check triples the interval.
                update_schedule(c, 1, update(false, 1700))?;
                let row = get_by_forwarding_index(c, 1)?.unwrap();
                assert_eq!(row.forwarding_next_check_secs, Some(1800));
                assert_eq!(row.forwarding_last_check, Some(1700));

                // Early no-op check keeps it.
                update_schedule(c, 1, update(false, 1800))?;
                let row = get_by_forwarding_index(c, 1)?.unwrap();
                assert_eq!(row.forwarding_next_check_secs, Some(1800));

                // Forwarding resets to base.
                update_schedule(c, 1, update(true, 1900))?;
                let row = get_by_forwarding_index(c, 1)?.unwrap();
                assert_eq!(row.forwarding_next_check_secs, Some(600));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_interval_is_capped() {
        let store = LedgerStore::open_memory().unwrap();
        store
            .read_blocking(|c| {
                insert_registration(c, &forwarding("a", 1, 0, MAX_CHECK_INTERVAL_SECS - 1))?;
                update_schedule(c, 1, update(false, MAX_CHECK_INTERVAL_SECS))?;
                let row = get_by_forwarding_index(c, 1)?.unwrap();
                assert_eq!(row.forwarding_next_check_secs, Some(MAX_CHECK_INTERVAL_SECS));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_latest_registration_wins_attribution() {
        let store = LedgerStore::open_memory().unwrap();
        store
            .read_blocking(|c| {
                let mut older = forwarding("older", 1, 0, 600);
                older.bitcoin_address = "1Same".into();
                older.forwarding_index = None;
                let mut newer = forwarding("newer", 2, 0, 600);
                newer.bitcoin_address = "1Same".into();
                newer.forwarding_index = None;
                insert_registration(c, &older)?;
                insert_registration(c, &newer)?;
                assert_eq!(latest_id_for_address(c, "1Same")?.as_deref(), Some("newer"));
                assert!(get_forwarding_by_address(c, "1Same")?.is_none());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_schedule_update_for_unknown_index_fails() {
        let store = LedgerStore::open_memory().unwrap();
        let result = store.read_blocking(|c| update_schedule(c, 42, update(true, 0)));
        assert!(result.is_err());
    }
}
