//! Daily request quota storage
//!
//! One row per (user, date) holding the number of requests the user may still
//! make that day. Every mutation is a single statement or transaction so
//! concurrent messages from the same user cannot lose updates.

use crate::error::{Error, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Remaining requests for one user on one date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaRecord {
    pub user_id: String,
    pub date: NaiveDate,
    pub request_count: u32,
}

/// Durable per-user-per-day counter
pub trait QuotaStore: Send + Sync {
    /// Read the record for (user, date), if any
    fn get(&self, user_id: &str, date: NaiveDate) -> Result<Option<QuotaRecord>>;

    /// Take one request. Returns false when there is no record or it is at zero.
    fn consume_one(&self, user_id: &str, date: NaiveDate) -> Result<bool>;

    /// Drop every record of the user and start `date` at zero
    fn initialize_day(&self, user_id: &str, date: NaiveDate) -> Result<()>;

    /// Add `amount` to (user, date), creating the day's record if needed.
    /// Returns the new count.
    fn credit(&self, user_id: &str, date: NaiveDate, amount: u32) -> Result<u32>;

    /// All records of a user, newest first
    fn history(&self, user_id: &str) -> Result<Vec<QuotaRecord>>;

    /// Delete every record of a user. Returns the number of rows removed.
    fn remove_user(&self, user_id: &str) -> Result<usize>;
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS request_limit (
    user_id       TEXT    NOT NULL,
    date          TEXT    NOT NULL,
    request_count INTEGER NOT NULL DEFAULT 0 CHECK (request_count >= 0),
    PRIMARY KEY (user_id, date)
)
"#;

/// SQLite-backed quota store
pub struct SqliteQuotaStore {
    conn: Mutex<Connection>,
}

impl SqliteQuotaStore {
    /// Open (or create) the quota database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    /// Private in-memory database (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::StoreLockPoisoned)
    }
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl QuotaStore for SqliteQuotaStore {
    fn get(&self, user_id: &str, date: NaiveDate) -> Result<Option<QuotaRecord>> {
        let conn = self.lock()?;
        let count: Option<u32> = conn
            .query_row(
                "SELECT request_count FROM request_limit WHERE user_id = ?1 AND date = ?2",
                params![user_id, date_key(date)],
                |row| row.get(0),
            )
            .optional()?;

        Ok(count.map(|request_count| QuotaRecord {
            user_id: user_id.to_string(),
            date,
            request_count,
        }))
    }

    fn consume_one(&self, user_id: &str, date: NaiveDate) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE request_limit SET request_count = request_count - 1
             WHERE user_id = ?1 AND date = ?2 AND request_count > 0",
            params![user_id, date_key(date)],
        )?;
        Ok(changed == 1)
    }

    fn initialize_day(&self, user_id: &str, date: NaiveDate) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM request_limit WHERE user_id = ?1",
            params![user_id],
        )?;
        tx.execute(
            "INSERT INTO request_limit (user_id, date, request_count) VALUES (?1, ?2, 0)",
            params![user_id, date_key(date)],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn credit(&self, user_id: &str, date: NaiveDate, amount: u32) -> Result<u32> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let day = date_key(date);
        // Stale days are dropped the same way initialize_day does
        tx.execute(
            "DELETE FROM request_limit WHERE user_id = ?1 AND date <> ?2",
            params![user_id, day],
        )?;
        tx.execute(
            "INSERT INTO request_limit (user_id, date, request_count) VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id, date)
             DO UPDATE SET request_count = request_count + excluded.request_count",
            params![user_id, day, amount],
        )?;
        let count: u32 = tx.query_row(
            "SELECT request_count FROM request_limit WHERE user_id = ?1 AND date = ?2",
            params![user_id, day],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(count)
    }

    fn history(&self, user_id: &str) -> Result<Vec<QuotaRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT date, request_count FROM request_limit
             WHERE user_id = ?1 ORDER BY date DESC",
        )?;

        let records = stmt
            .query_map(params![user_id], |row| {
                let date: String = row.get(0)?;
                Ok(QuotaRecord {
                    user_id: user_id.to_string(),
                    date: parse_date(&date)?,
                    request_count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn remove_user(&self, user_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM request_limit WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(removed)
    }
}
