//! SQLite-backed key-value store.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::{KeyValueStore, StoreError};

const UPSERT_SQL: &str = r#"
    INSERT INTO kv (key, value, updated_at)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(key) DO UPDATE SET
        value = excluded.value,
        updated_at = excluded.updated_at
"#;

/// Key-value store that owns one SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the store at the default location.
    ///
    /// The default location is `~/.local/share/refinery/refinery.db`.
    pub fn open() -> Result<Self, StoreError> {
        let path = Self::default_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Self::open_at(&path)
    }

    /// Open or create the store at a specific path.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        debug!(path = %path.display(), "Opened key-value store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("refinery")
            .join("refinery.db")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn()?
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn()?
            .execute(UPSERT_SQL, params![key, value, Utc::now().to_rfc3339()])?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.conn()?
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// All entries commit in one transaction or none do
    fn write_batch(&self, entries: &[(&str, Option<&str>)]) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        for (key, value) in entries {
            match value {
                Some(value) => tx.execute(UPSERT_SQL, params![key, value, now])?,
                None => tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?,
            };
        }

        tx.commit()?;
        debug!(entries = entries.len(), "Committed key-value batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let store = SqliteStore::open_in_memory().unwrap();

        assert!(store.get("currentIterations").unwrap().is_none());

        store.set("currentIterations", "[]").unwrap();
        assert_eq!(
            store.get("currentIterations").unwrap().as_deref(),
            Some("[]")
        );

        store.set("currentIterations", r#"[{"id":"x"}]"#).unwrap();
        assert_eq!(
            store.get("currentIterations").unwrap().as_deref(),
            Some(r#"[{"id":"x"}]"#)
        );

        store.remove("currentIterations").unwrap();
        assert!(store.get("currentIterations").unwrap().is_none());

        // Removing again is fine
        store.remove("currentIterations").unwrap();
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refinery.db");

        {
            let store = SqliteStore::open_at(&path).unwrap();
            store.set("currentIterationIndex", "2").unwrap();
        }

        let reopened = SqliteStore::open_at(&path).unwrap();
        assert_eq!(
            reopened.get("currentIterationIndex").unwrap().as_deref(),
            Some("2")
        );
    }

    #[test]
    fn test_batch_commits_together() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("currentAnalysis", "{}").unwrap();

        store
            .write_batch(&[
                ("currentIterations", Some("[]")),
                ("currentIterationIndex", Some("0")),
                ("currentAnalysis", None),
            ])
            .unwrap();

        assert_eq!(
            store.get("currentIterations").unwrap().as_deref(),
            Some("[]")
        );
        assert_eq!(
            store.get("currentIterationIndex").unwrap().as_deref(),
            Some("0")
        );
        assert!(store.get("currentAnalysis").unwrap().is_none());
    }

    #[test]
    fn test_failed_batch_leaves_nothing_behind() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("currentIterationIndex", "1").unwrap();

        // Reject the second entry so the batch fails partway through
        store
            .conn()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER fail_index BEFORE INSERT ON kv \
                 WHEN NEW.key = 'currentAnalysis' \
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let result = store.write_batch(&[
            ("currentIterationIndex", Some("2")),
            ("currentAnalysis", Some("{}")),
        ]);

        assert!(result.is_err());
        assert_eq!(
            store.get("currentIterationIndex").unwrap().as_deref(),
            Some("1")
        );
        assert!(store.get("currentAnalysis").unwrap().is_none());
    }

    #[test]
    fn test_default_path_layout() {
        let path = SqliteStore::default_path();
        assert!(path.ends_with("refinery/refinery.db"));
    }
}
