//! SQLite-backed key-value store

use super::{check_entry_size, KeyValueStore};
use crate::error::StoreError;
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Key-value store in a single SQLite table.
///
/// Blocking SQLite calls run on the blocking thread pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    entry_limit: usize,
}

impl SqliteStore {
    /// Open (or create) the store file, creating parent directories as needed
    pub fn open(path: &Path, entry_limit: usize) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Backend(format!("Failed to create {:?}: {}", parent, e)))?;
        }
        debug!("Opening key-value store at {:?}", path);
        Self::init(Connection::open(path)?, entry_limit)
    }

    pub fn open_in_memory(entry_limit: usize) -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, entry_limit)
    }

    fn init(conn: Connection, entry_limit: usize) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            entry_limit,
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row("SELECT value FROM kv_entries WHERE key = ?1", [&key], |row| row.get(0))
                .optional()?)
        })
        .await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        check_entry_size(key, value.len(), Some(self.entry_limit))?;
        let key = key.to_string();
        let value = value.to_vec();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv_entries (key, value) VALUES (?1, ?2)",
                rusqlite::params![key, value],
            )?;
            Ok(())
        })
        .await
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM kv_entries WHERE key = ?1", [&key])?;
            Ok(())
        })
        .await
    }

    fn max_entry_size(&self) -> Option<usize> {
        Some(self.entry_limit)
    }
}
