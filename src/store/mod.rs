//! Persistent key-value storage
//!
//! Backends hold opaque byte values under string keys and may impose a
//! per-entry size ceiling. Large blobs go through [`chunked::ChunkedBlobStore`].

pub mod chunked;
mod sqlite;

use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub use sqlite::SqliteStore;

/// Persistent key-value backend capability.
///
/// Individual operations are serialized by the backend; sequences of
/// operations are not atomic.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// Largest value this backend accepts, if bounded
    fn max_entry_size(&self) -> Option<usize> {
        None
    }
}

pub(crate) fn check_entry_size(key: &str, size: usize, limit: Option<usize>) -> Result<(), StoreError> {
    match limit {
        Some(limit) if size > limit => Err(StoreError::EntryTooLarge {
            key: key.to_string(),
            size,
            limit,
        }),
        _ => Ok(()),
    }
}

/// In-memory backend
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    entry_limit: Option<usize>,
    /// Number of further `set` calls allowed before writes start failing
    write_budget: Mutex<Option<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry_limit(limit: usize) -> Self {
        Self {
            entry_limit: Some(limit),
            ..Self::default()
        }
    }

    /// Let `writes` more `set` calls succeed, then fail every later one
    /// as a full backend would.
    pub fn fail_writes_after(&self, writes: usize) {
        *lock(&self.write_budget) = Some(writes);
    }

    pub fn clear_write_failures(&self) {
        *lock(&self.write_budget) = None;
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.entries).keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        check_entry_size(key, value.len(), self.entry_limit)?;
        {
            let mut budget = lock(&self.write_budget);
            match budget.as_mut() {
                Some(0) => {
                    return Err(StoreError::Backend(format!("Quota exceeded writing {}", key)));
                }
                Some(n) => *n -= 1,
                None => {}
            }
        }
        lock(&self.entries).insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        lock(&self.entries).remove(key);
        Ok(())
    }

    fn max_entry_size(&self) -> Option<usize> {
        self.entry_limit
    }
}
