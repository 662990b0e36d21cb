//! SQLite persistence layer.
//!
//! RULE: only the store modules talk to the database. Services call store
//! functions — they never execute SQL directly.
//!
//! Every balance-mutating operation runs through [`LedgerStore::exclusive_tx`]:
//! BEGIN IMMEDIATE takes the write lock up front, the current row state is
//! read and validated under that lock, and the new balance plus the immutable
//! ledger record commit together or not at all.

pub(crate) mod application;
pub(crate) mod loan;
pub(crate) mod loan_type;
pub(crate) mod payment;
pub(crate) mod saving;

use chrono::Utc;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};

use crate::error::{LedgerError, LedgerResult};

pub struct LedgerStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl LedgerStore {
    pub fn open(path: &str) -> LedgerResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_millis(250))?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> LedgerResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    pub fn reopen(&self) -> LedgerResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> LedgerResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a BEGIN IMMEDIATE transaction.
    ///
    /// The write lock is held before `f` reads anything, so validation always
    /// sees current state. Any error rolls the whole transaction back.
    /// SQLITE_BUSY is retried up to `busy_retries` times; business-rule
    /// failures surface on the first attempt.
    pub fn exclusive_tx<T>(
        &self,
        busy_retries: u32,
        mut f: impl FnMut(&Transaction<'_>) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let mut attempt = 0;
        loop {
            let result = (|| -> LedgerResult<T> {
                let tx =
                    Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
                let value = f(&tx)?;
                tx.commit()?;
                Ok(value)
            })();
            match result {
                Err(LedgerError::Database(e)) if is_busy(&e) => {
                    if attempt < busy_retries {
                        attempt += 1;
                        log::warn!("write transaction busy, retry {attempt}/{busy_retries}");
                        continue;
                    }
                    return Err(LedgerError::integrity(format!(
                        "lock contention unresolved after {busy_retries} retries: {e}"
                    )));
                }
                other => return other,
            }
        }
    }

    // ── External collaborators ─────────────────────────────────────
    // Identity and branch CRUD live outside this engine; the ledger only
    // needs the rows to exist for foreign keys and existence checks.

    pub fn insert_customer(&self, customer_id: &str, name: &str) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO customer (customer_id, name, created_at) VALUES (?1, ?2, ?3)",
            params![customer_id, name, Utc::now()],
        )?;
        Ok(())
    }

    pub fn insert_branch(&self, branch_id: &str, name: &str) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO branch (branch_id, name) VALUES (?1, ?2)",
            params![branch_id, name],
        )?;
        Ok(())
    }
}

pub(crate) fn customer_exists(conn: &Connection, customer_id: &str) -> LedgerResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM customer WHERE customer_id = ?1",
        params![customer_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn branch_exists(conn: &Connection, branch_id: &str) -> LedgerResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM branch WHERE branch_id = ?1",
        params![branch_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::DatabaseBusy
                || f.code == rusqlite::ErrorCode::DatabaseLocked
    )
}
