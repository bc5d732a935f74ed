//! Ledger store.
//!
//! # Data Flow
//! ```text
//! Reconciler ──write──→ watermarks + payments (+ draws seeded ahead)
//! Settlement ──write──→ draws (block hash claim, winner, carry into n+1)
//! Registry   ──write──→ sponsors, registered_addresses, sequences
//! Sweep      ──write──→ registered_addresses schedule columns
//! ```
//!
//! # Design Decisions
//! - Single SQLite connection behind a mutex; every unit of work runs on a
//!   blocking thread inside one IMMEDIATE transaction (serializable in SQLite)
//! - A unit of work has started once `spawn_blocking` accepts it; dropping
//!   the caller's future does not abandon it half-way
//! - Busy/locked failures rerun the whole unit exactly once; any other error
//!   rolls back and surfaces
//! - Mutations check affected row counts and fail as conflicts or invariant
//!   violations instead of silently succeeding

pub mod migrations;
pub mod queries;
pub mod schema;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use thiserror::Error;

use crate::config::LedgerConfig;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Ledger error types.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Optimistic check lost: the row changed underneath the caller.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("draw {draw_id} is already finalized")]
    AlreadyFinalized { draw_id: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    /// Row counts or stored values that should be impossible.
    #[error("ledger invariant violated: {0}")]
    Invariant(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("ledger task failed: {0}")]
    Task(String),
}

impl LedgerError {
    /// SQLite reported the database as busy or locked (our deadlock analogue).
    pub fn is_busy(&self) -> bool {
        match self {
            LedgerError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            }
            _ => false,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Fail with `Invariant` unless exactly one row was affected.
pub(crate) fn expect_one_row(affected: usize, what: &str) -> LedgerResult<()> {
    if affected != 1 {
        return Err(LedgerError::Invariant(format!(
            "{what}: expected 1 row, affected {affected}"
        )));
    }
    Ok(())
}

/// Handle to the ledger database. Clones share the connection.
#[derive(Clone)]
pub struct LedgerStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStore").finish_non_exhaustive()
    }
}

impl LedgerStore {
    /// Open or create the ledger at `config.path` and run migrations.
    pub fn open(config: &LedgerConfig) -> LedgerResult<Self> {
        let conn = Connection::open(Path::new(&config.path))?;
        configure(&conn, config.busy_timeout_ms)?;
        migrations::run(&conn)?;
        tracing::info!(path = %config.path, "Ledger opened");
        Ok(Self::from_connection(conn))
    }

    /// In-memory ledger for tests and dry runs.
    pub fn open_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        configure(&conn, 5000)?;
        migrations::run(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-unit drops its Transaction, which rolls back.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run a read-only closure on the calling thread.
    pub fn read_blocking<T>(&self, f: impl FnOnce(&Connection) -> LedgerResult<T>) -> LedgerResult<T> {
        let conn = self.lock();
        f(&conn)
    }

    /// Run `f` in an IMMEDIATE transaction on the calling thread.
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise. A busy/locked
    /// failure reruns `f` once.
    pub fn write_blocking<T>(
        &self,
        unit: &'static str,
        mut f: impl FnMut(&Transaction<'_>) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        match self.write_once(&mut f) {
            Err(e) if e.is_busy() => {
                tracing::warn!(unit, error = %e, "Ledger busy, retrying unit of work once");
                self.write_once(&mut f)
            }
            other => other,
        }
    }

    fn write_once<T>(
        &self,
        f: &mut impl FnMut(&Transaction<'_>) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Async read on the blocking pool.
    pub async fn read<T, F>(&self, f: F) -> LedgerResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> LedgerResult<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.read_blocking(f))
            .await
            .map_err(|e| LedgerError::Task(e.to_string()))?
    }

    /// Async unit of work on the blocking pool. See [`LedgerStore::write_blocking`].
    pub async fn write<T, F>(&self, unit: &'static str, f: F) -> LedgerResult<T>
    where
        T: Send + 'static,
        F: FnMut(&Transaction<'_>) -> LedgerResult<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.write_blocking(unit, f))
            .await
            .map_err(|e| LedgerError::Task(e.to_string()))?
    }
}

fn configure(conn: &Connection, busy_timeout_ms: u64) -> LedgerResult<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA synchronous = NORMAL;",
    )?;
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
    Ok(())
}
