//! Entity store: one row per tracked identifier.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{parse_datetime, Result};
use crate::error::StoreError;
use crate::models::{ConnectionStatus, Entity};

/// Per-status row counts for reporting.
pub type StatusCounts = BTreeMap<&'static str, u64>;

/// SQLite-backed entity store.
///
/// Every call opens its own connection and commits before returning, so a
/// crash loses at most the in-flight write.
#[derive(Debug, Clone)]
pub struct EntityRepository {
    db_path: PathBuf,
}

impl EntityRepository {
    /// Open (creating if needed) the store at `db_path`.
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    /// Get the database path.
    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<rusqlite::Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS connections (
                url TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                message TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_status ON connections(status);
        "#,
        )?;
        Ok(())
    }

    /// Insert or replace the row for `id`.
    pub fn upsert(
        &self,
        id: &str,
        status: ConnectionStatus,
        message: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO connections (url, status, message, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(url) DO UPDATE SET
                status = excluded.status,
                message = excluded.message,
                updated_at = excluded.updated_at
            "#,
            params![id, status.as_str(), message, timestamp.to_rfc3339()],
        )?;
        debug!(url = %id, status = status.as_str(), "Stored status");
        Ok(())
    }

    /// Record `status` for `id` stamped with the current time.
    pub fn record(&self, id: &str, status: ConnectionStatus, message: &str) -> Result<()> {
        self.upsert(id, status, Some(message), Utc::now())
    }

    /// Insert `id` as pending unless a row already exists. Returns true when inserted.
    pub fn insert_if_absent(&self, id: &str) -> Result<bool> {
        let conn = self.connect()?;
        let rows = conn.execute(
            r#"
            INSERT INTO connections (url, status, message, updated_at)
            VALUES (?1, ?2, NULL, ?3)
            ON CONFLICT(url) DO NOTHING
            "#,
            params![id, ConnectionStatus::Pending.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(rows > 0)
    }

    /// Current status of `id`, if tracked.
    pub fn get_status(&self, id: &str) -> Result<Option<ConnectionStatus>> {
        let conn = self.connect()?;
        let raw = super::to_option(conn.query_row(
            "SELECT status FROM connections WHERE url = ?",
            params![id],
            |row| row.get::<_, String>(0),
        ))?;
        raw.map(|s| parse_status(&s)).transpose()
    }

    /// Every id eligible for processing (`pending` or `failed`), oldest first.
    pub fn list_pending(&self) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT url FROM connections WHERE status IN (?1, ?2) ORDER BY updated_at, url",
        )?;
        let ids = stmt
            .query_map(
                params![
                    ConnectionStatus::Pending.as_str(),
                    ConnectionStatus::Failed.as_str()
                ],
                |row| row.get::<_, String>(0),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// All rows, for reporting.
    pub fn list_all(&self) -> Result<Vec<Entity>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT url, status, message, updated_at FROM connections ORDER BY url")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>("url")?,
                    row.get::<_, String>("status")?,
                    row.get::<_, Option<String>>("message")?,
                    row.get::<_, String>("updated_at")?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, status, message, updated_at)| {
                Ok(Entity {
                    id,
                    status: parse_status(&status)?,
                    message,
                    updated_at: parse_datetime(&updated_at),
                })
            })
            .collect()
    }

    /// Get a single row.
    pub fn get(&self, id: &str) -> Result<Option<Entity>> {
        let conn = self.connect()?;
        let raw = super::to_option(conn.query_row(
            "SELECT url, status, message, updated_at FROM connections WHERE url = ?",
            params![id],
            row_to_raw,
        ))?;
        raw.map(|(id, status, message, updated_at)| {
            Ok(Entity {
                id,
                status: parse_status(&status)?,
                message,
                updated_at: parse_datetime(&updated_at),
            })
        })
        .transpose()
    }

    /// Row counts grouped by status. Statuses with no rows are reported as zero.
    pub fn count_by_status(&self) -> Result<StatusCounts> {
        let conn = self.connect()?;
        let mut counts: StatusCounts = ConnectionStatus::ALL
            .iter()
            .map(|s| (s.as_str(), 0))
            .collect();

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM connections GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for (status, count) in rows {
            let status = parse_status(&status)?;
            counts.insert(status.as_str(), count.max(0) as u64);
        }
        Ok(counts)
    }
}

type RawRow = (String, String, Option<String>, String);

fn row_to_raw(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get("url")?,
        row.get("status")?,
        row.get("message")?,
        row.get("updated_at")?,
    ))
}

fn parse_status(s: &str) -> Result<ConnectionStatus> {
    ConnectionStatus::from_str(s).ok_or_else(|| StoreError::InvalidStatus(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn setup() -> (TempDir, EntityRepository) {
        let dir = TempDir::new().unwrap();
        let repo = EntityRepository::new(&dir.path().join("nested").join("connections.db")).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_upsert_replaces_existing_row() {
        let (_dir, repo) = setup();
        let id = "https://www.linkedin.com/in/alice";

        repo.upsert(id, ConnectionStatus::Pending, None, Utc::now())
            .unwrap();
        repo.upsert(id, ConnectionStatus::Success, Some("Successfully removed"), Utc::now())
            .unwrap();

        let all = repo.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, ConnectionStatus::Success);
        assert_eq!(all[0].message.as_deref(), Some("Successfully removed"));
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let (_dir, repo) = setup();
        let ts = Utc::now();
        for _ in 0..3 {
            repo.upsert("a", ConnectionStatus::Failed, Some("x"), ts)
                .unwrap();
        }
        let entity = repo.get("a").unwrap().unwrap();
        assert_eq!(entity.status, ConnectionStatus::Failed);
        assert_eq!(entity.updated_at.timestamp(), ts.timestamp());
        assert_eq!(repo.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_get_status_absent() {
        let (_dir, repo) = setup();
        assert_eq!(repo.get_status("missing").unwrap(), None);
        assert!(repo.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_list_pending_includes_failed_only() {
        let (_dir, repo) = setup();
        let base = Utc::now();
        repo.upsert("p", ConnectionStatus::Pending, None, base).unwrap();
        repo.upsert("f", ConnectionStatus::Failed, Some("Timeout after 20s"), base + Duration::seconds(1))
            .unwrap();
        repo.upsert("s", ConnectionStatus::Success, None, base).unwrap();
        repo.upsert("n", ConnectionStatus::NotConnected, None, base).unwrap();
        repo.upsert("u", ConnectionStatus::Unknown, None, base).unwrap();

        assert_eq!(repo.list_pending().unwrap(), vec!["p", "f"]);
    }

    #[test]
    fn test_insert_if_absent_never_downgrades() {
        let (_dir, repo) = setup();
        repo.record("a", ConnectionStatus::Success, "Successfully removed")
            .unwrap();

        assert!(!repo.insert_if_absent("a").unwrap());
        assert!(repo.insert_if_absent("b").unwrap());
        assert!(!repo.insert_if_absent("b").unwrap());

        assert_eq!(repo.get_status("a").unwrap(), Some(ConnectionStatus::Success));
        assert_eq!(repo.get_status("b").unwrap(), Some(ConnectionStatus::Pending));
    }

    #[test]
    fn test_count_by_status() {
        let (_dir, repo) = setup();
        repo.insert_if_absent("a").unwrap();
        repo.insert_if_absent("b").unwrap();
        repo.record("c", ConnectionStatus::NotConnected, "Already not connected")
            .unwrap();

        let counts = repo.count_by_status().unwrap();
        assert_eq!(counts["pending"], 2);
        assert_eq!(counts["not_connected"], 1);
        assert_eq!(counts["success"], 0);
        assert_eq!(counts.values().sum::<u64>(), 3);
    }

    #[test]
    fn test_durable_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("connections.db");
        {
            let repo = EntityRepository::new(&path).unwrap();
            repo.record("a", ConnectionStatus::Failed, "Error: boom").unwrap();
        }
        let reopened = EntityRepository::new(&path).unwrap();
        assert_eq!(reopened.get_status("a").unwrap(), Some(ConnectionStatus::Failed));
    }

    #[test]
    fn test_unknown_status_in_store_is_reported() {
        let (_dir, repo) = setup();
        let conn = repo.connect().unwrap();
        conn.execute(
            "INSERT INTO connections (url, status, message, updated_at) VALUES ('x', 'removed', NULL, '')",
            [],
        )
        .unwrap();
        assert!(matches!(
            repo.get_status("x"),
            Err(StoreError::InvalidStatus(s)) if s == "removed"
        ));
    }
}
