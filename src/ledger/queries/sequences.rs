//! Durable index allocation. An allocated value is never handed out again.

use crate::ledger::{expect_one_row, LedgerResult};
use rusqlite::Connection;

/// Sponsor deposit address indices.
pub const SPONSOR_INDEX: &str = "sponsor_index";
/// Forwarding deposit key indices.
pub const FORWARDING_INDEX: &str = "forwarding_index";

/// Allocate the next value of `name`, starting at 1.
pub fn next_value(conn: &Connection, name: &str) -> LedgerResult<u32> {
    conn.execute(
        "INSERT OR IGNORE INTO sequences (name, next_value) VALUES (?1, 1)",
        [name],
    )?;
    let value: i64 = conn.query_row(
        "SELECT next_value FROM sequences WHERE name = ?1",
        [name],
        |row| row.get(0),
    )?;
    let updated = conn.execute(
        "UPDATE sequences SET next_value = next_value + 1 WHERE name = ?1",
        [name],
    )?;
    expect_one_row(updated, "advance sequence")?;
    Ok(value as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerStore;

    #[test]
    fn test_sequences_are_independent_and_increasing() {
        let store = LedgerStore::open_memory().unwrap();
        store
            .write_blocking("test", |tx| {
                assert_eq!(next_value(tx, SPONSOR_INDEX)?, 1);
                assert_eq!(next_value(tx, SPONSOR_INDEX)?, 2);
                assert_eq!(next_value(tx, FORWARDING_INDEX)?, 1);
                assert_eq!(next_value(tx, SPONSOR_INDEX)?, 3);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_rolled_back_allocation_is_not_lost_twice() {
        let store = LedgerStore::open_memory().unwrap();
        let _: crate::ledger::LedgerResult<()> = store.write_blocking("test", |tx| {
            next_value(tx, FORWARDING_INDEX)?;
            Err(crate::ledger::LedgerError::Invariant("abort".into()))
        });
        let value = store
            .write_blocking("test", |tx| next_value(tx, FORWARDING_INDEX))
            .unwrap();
        assert_eq!(value, 1);
    }
}
