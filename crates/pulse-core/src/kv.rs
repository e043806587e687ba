//! Key-value string stores backing the cache records.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{RusqliteErrorExt, StoreError};

/// The narrow persistence contract the refresh pipeline writes through.
pub trait KeyValueStore: Send + Sync {
    /// Read the value for `key`, `Ok(None)` when unset.
    fn get_string(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Overwrite the value for `key`.
    fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-memory store. Counts writes so callers can observe redundant ones.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    writes: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set_string` calls since creation.
    pub fn writes(&self) -> usize {
        *self.writes.lock()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        *self.writes.lock() += 1;
        Ok(())
    }
}

/// SQLite-backed store, one row per key.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
        let conn =
            Connection::open(path).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .lock()
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                "#,
            )
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

impl KeyValueStore for SqliteStore {
    fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.conn
            .lock()
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| e.into_store_error(key, false))
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let now = Utc::now().timestamp_millis();
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key, value, now],
            )
            .map_err(|e| e.into_store_error(key, true))?;
        Ok(())
    }
}
