//! Large blobs split across fixed-size entries
//!
//! Layout for a blob stored under `key`:
//!
//! - `{key}--bytes`: total length, little-endian `u64`
//! - `{key}--chunk-{i}`: bytes `[i * CHUNK, min((i + 1) * CHUNK, len))`
//!
//! The length entry is only present while every chunk it describes is
//! present: writes put chunks first and the length last, deletes remove the
//! length last. A crash mid-sequence can leave orphaned chunks, never a
//! length entry pointing at missing chunks.

use super::KeyValueStore;
use crate::error::StoreError;
use std::sync::Arc;
use tracing::{debug, warn};

/// Chunk size in bytes, kept under typical per-entry backend ceilings
pub const CHUNK_SIZE: usize = 100_000_000;

pub fn chunk_key(key: &str, i: usize) -> String {
    format!("{}--chunk-{}", key, i)
}

pub fn bytes_key(key: &str) -> String {
    format!("{}--bytes", key)
}

pub const fn chunk_count(len: usize, chunk: usize) -> usize {
    len.div_ceil(chunk)
}

pub struct ChunkedBlobStore<const CHUNK: usize = CHUNK_SIZE> {
    store: Arc<dyn KeyValueStore>,
}

impl<const CHUNK: usize> Clone for ChunkedBlobStore<CHUNK> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store) }
    }
}

impl<const CHUNK: usize> ChunkedBlobStore<CHUNK> {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    async fn read_len(&self, key: &str) -> Result<Option<usize>, StoreError> {
        let meta_key = bytes_key(key);
        let Some(raw) = self.store.get(&meta_key).await? else {
            return Ok(None);
        };
        let raw: [u8; 8] = raw
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Corrupt(format!("{} holds {} bytes, expected 8", meta_key, raw.len())))?;
        let len = usize::try_from(u64::from_le_bytes(raw))
            .map_err(|_| StoreError::Corrupt(format!("{} length does not fit in memory", meta_key)))?;
        Ok(Some(len))
    }

    /// Store `bytes` under `key`, replacing any previous blob
    pub async fn set_large(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let previous = self.read_len(key).await.unwrap_or_else(|e| {
            warn!("Ignoring unreadable length for {}: {}", key, e);
            None
        });

        // Invalidate the old blob before its chunks get overwritten
        if previous.is_some() {
            self.store.del(&bytes_key(key)).await?;
        }

        let count = chunk_count(bytes.len(), CHUNK);
        for (i, chunk) in bytes.chunks(CHUNK).enumerate() {
            self.store.set(&chunk_key(key, i), chunk).await?;
        }

        self.store
            .set(&bytes_key(key), &(bytes.len() as u64).to_le_bytes())
            .await?;

        if let Some(previous_len) = previous {
            for i in count..chunk_count(previous_len, CHUNK) {
                self.store.del(&chunk_key(key, i)).await?;
            }
        }

        debug!("Stored {} bytes under {} in {} chunks", bytes.len(), key, count);
        Ok(())
    }

    /// Reassemble the blob under `key`, `None` if no complete blob exists
    pub async fn get_large(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(len) = self.read_len(key).await? else {
            return Ok(None);
        };

        let mut bytes = vec![0u8; len];
        for i in 0..chunk_count(len, CHUNK) {
            let ck = chunk_key(key, i);
            let chunk = self
                .store
                .get(&ck)
                .await?
                .ok_or_else(|| StoreError::Corrupt(format!("Missing chunk {}", ck)))?;

            let start = i * CHUNK;
            let end = (start + CHUNK).min(len);
            if chunk.len() != end - start {
                return Err(StoreError::Corrupt(format!(
                    "Chunk {} is {} bytes, expected {}",
                    ck,
                    chunk.len(),
                    end - start
                )));
            }
            bytes[start..end].copy_from_slice(&chunk);
        }

        Ok(Some(bytes))
    }

    /// Whether a complete blob is recorded under `key`
    pub async fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.read_len(key).await?.is_some())
    }

    /// Delete the blob under `key`: chunks first, length entry last
    pub async fn del_large(&self, key: &str) -> Result<(), StoreError> {
        let Some(len) = self.read_len(key).await? else {
            return Ok(());
        };

        self.del_chunks(key, len).await?;
        self.store.del(&bytes_key(key)).await?;

        debug!("Deleted {} ({} chunks)", key, chunk_count(len, CHUNK));
        Ok(())
    }

    /// Delete the chunk entries a `len`-byte blob under `key` would occupy,
    /// whether or not a length entry records them. Clears orphans left by an
    /// interrupted `set_large`.
    pub async fn del_chunks(&self, key: &str, len: usize) -> Result<(), StoreError> {
        for i in 0..chunk_count(len, CHUNK) {
            self.store.del(&chunk_key(key, i)).await?;
        }
        Ok(())
    }
}
