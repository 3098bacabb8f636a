//! Repository layer for SQLite persistence.

mod entity;

pub use entity::{EntityRepository, StatusCounts};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

use crate::error::StoreError;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Open a connection with the pragmas every repository expects.
pub(crate) fn connect(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    // Every committed write must reach disk before the call returns
    conn.pragma_update(None, "synchronous", "FULL")?;
    Ok(conn)
}

/// Convert a `QueryReturnedNoRows` error into `Ok(None)`.
pub(crate) fn to_option<T>(result: rusqlite::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}
