//! Scan watermarks, one row per tracked address.

use rusqlite::{Connection, OptionalExtension};

use crate::ledger::queries::payments::PaymentKind;
use crate::ledger::{LedgerError, LedgerResult};

/// Create the watermark row if missing. Returns the current height.
pub fn ensure(conn: &Connection, address: &str, kind: PaymentKind, initial: u64) -> LedgerResult<u64> {
    conn.execute(
        "INSERT OR IGNORE INTO watermarks (address, kind, scanned_height) VALUES (?1, ?2, ?3)",
        rusqlite::params![address, kind.as_str(), initial as i64],
    )?;
    get(conn, address)?.ok_or_else(|| LedgerError::NotFound(format!("watermark for {address}")))
}

/// Scanned height for `address`, if tracked.
pub fn get(conn: &Connection, address: &str) -> LedgerResult<Option<u64>> {
    let height: Option<i64> = conn
        .query_row(
            "SELECT scanned_height FROM watermarks WHERE address = ?1",
            [address],
            |row| row.get(0),
        )
        .optional()?;
    Ok(height.map(|h| h as u64))
}

/// Move the watermark from `expected` to `new_height`.
///
/// Exactly one row must match `expected`; otherwise another pass got there
/// first and the caller's view is stale.
pub fn advance(conn: &Connection, address: &str, expected: u64, new_height: u64) -> LedgerResult<()> {
    let updated = conn.execute(
        "UPDATE watermarks SET scanned_height = ?1 WHERE address = ?2 AND scanned_height = ?3",
        rusqlite::params![new_height as i64, address, expected as i64],
    )?;
    if updated != 1 {
        return Err(LedgerError::Conflict(format!(
            "watermark for {address} is no longer {expected}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerStore;

    #[test]
    fn test_ensure_is_idempotent() {
        let store = LedgerStore::open_memory().unwrap();
        store
            .read_blocking(|c| {
                assert_eq!(ensure(c, "1Pot", PaymentKind::Lottery, 100)?, 100);
                assert_eq!(ensure(c, "1Pot", PaymentKind::Lottery, 500)?, 100);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_stale_advance_is_conflict() {
        let store = LedgerStore::open_memory().unwrap();
        store
            .read_blocking(|c| {
                ensure(c, "1Pot", PaymentKind::Lottery, 100)?;
                advance(c, "1Pot", 100, 120)?;
                assert!(matches!(
                    advance(c, "1Pot", 100, 130),
                    Err(LedgerError::Conflict(_))
                ));
                assert_eq!(get(c, "1Pot")?, Some(120));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_untracked_address() {
        let store = LedgerStore::open_memory().unwrap();
        store
            .read_blocking(|c| {
                assert_eq!(get(c, "1Nobody")?, None);
                assert!(advance(c, "1Nobody", 0, 1).is_err());
                Ok(())
            })
            .unwrap();
    }
}
