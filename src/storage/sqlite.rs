//! SQLite-backed [`StoragePort`] adapter.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::schema;
use super::StoragePort;
use crate::error::StorageError;

/// Key-value storage in a single SQLite file.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

/// Size of one stored key, reported by [`SqliteStorage::health`].
#[derive(Debug, Clone, Serialize)]
pub struct KeyUsage {
    pub key: String,
    pub bytes: u64,
    pub updated_at: String,
}

/// Result of [`SqliteStorage::health`].
#[derive(Debug, Clone, Serialize)]
pub struct StorageHealth {
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub schema_version: Option<u32>,
    pub keys: Vec<KeyUsage>,
}

impl SqliteStorage {
    /// Open (or create) the database at the given path with schema initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;

        schema::init_schema(&conn)?;

        tracing::info!(path = %path.display(), "storage initialized");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database. Contents vanish on drop.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Unavailable(format!("db lock poisoned: {e}")))
    }

    /// Integrity check plus per-key sizes.
    pub fn health(&self) -> Result<StorageHealth, StorageError> {
        let conn = self.lock()?;

        let integrity_details: String =
            conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        let schema_version = schema::schema_version(&conn)?;

        let mut stmt = conn.prepare(
            "SELECT key, LENGTH(CAST(value AS BLOB)), updated_at FROM kv_store ORDER BY key",
        )?;
        let keys = stmt
            .query_map([], |row| {
                Ok(KeyUsage {
                    key: row.get(0)?,
                    bytes: row.get::<_, i64>(1)?.max(0) as u64,
                    updated_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StorageHealth {
            integrity_ok: integrity_details == "ok",
            integrity_details,
            schema_version,
            keys,
        })
    }
}

impl StoragePort for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE \
             SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        tracing::debug!(key, bytes = value.len(), "storage key written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_existing_key() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.set("k", "one").unwrap();
        storage.set("k", "two").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("two"));
        assert!(storage.get("missing").unwrap().is_none());
    }

    #[test]
    fn health_reports_keys() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.set("b", "12345").unwrap();
        storage.set("a", "xy").unwrap();

        let report = storage.health().unwrap();
        assert!(report.integrity_ok);
        assert_eq!(report.schema_version, Some(schema::CURRENT_SCHEMA_VERSION));
        let keys: Vec<(&str, u64)> = report
            .keys
            .iter()
            .map(|k| (k.key.as_str(), k.bytes))
            .collect();
        assert_eq!(keys, vec![("a", 2), ("b", 5)]);
    }
}
