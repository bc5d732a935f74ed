//! Forward-only migrations keyed on `PRAGMA user_version`.

use rusqlite::Connection;

use crate::ledger::{schema, LedgerError, LedgerResult, SCHEMA_VERSION};

/// Run all pending migrations.
pub fn run(conn: &Connection) -> LedgerResult<()> {
    let current_version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if current_version == 0 {
        tracing::info!(version = SCHEMA_VERSION, "Initializing ledger schema");
        conn.execute_batch(schema::SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        for version in (current_version + 1)..=SCHEMA_VERSION {
            tracing::info!(version, "Running ledger migration");
            run_migration(conn, version)?;
            conn.pragma_update(None, "user_version", version)?;
        }
    } else if current_version > SCHEMA_VERSION {
        return Err(LedgerError::Migration(format!(
            "ledger version {current_version} is newer than supported {SCHEMA_VERSION}"
        )));
    }

    Ok(())
}

fn run_migration(_conn: &Connection, version: u32) -> LedgerResult<()> {
    Err(LedgerError::Migration(format!("unknown migration version: {version}")))
}
