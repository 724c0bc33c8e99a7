//! Offline index lifecycle: download, persist, initialize, delete
//!
//! ```text
//! Disabled -> Downloading -> Initializing -> Ready
//! Downloading -> Disabled   (failure: partial data deleted)
//! Ready -> Disabled         (user disable: persisted bytes deleted)
//! ```

use crate::downloader::{download_index, DownloadCancelled, DownloadProgress, DownloadState, IndexSource};
use crate::engine::EngineWorker;
use crate::error::ClientError;
use crate::store::chunked::ChunkedBlobStore;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Offline-mode state observed by the UI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfflineState {
    pub enabled: bool,
    /// The engine has accepted the index bytes
    pub initialized: bool,
    pub loading: bool,
    /// Download progress in `[0, 1]`
    pub index_bytes_progress: f64,
    pub error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexPhase {
    Disabled,
    Downloading,
    Initializing,
    Ready,
}

impl OfflineState {
    pub fn phase(&self) -> IndexPhase {
        if !self.enabled {
            IndexPhase::Disabled
        } else if self.initialized {
            IndexPhase::Ready
        } else if !self.loading {
            IndexPhase::Disabled
        } else if self.index_bytes_progress < 1.0 {
            IndexPhase::Downloading
        } else {
            IndexPhase::Initializing
        }
    }

    /// Whether searches should go to the embedded engine
    pub fn is_offline_ready(&self) -> bool {
        self.enabled && self.initialized
    }
}

pub struct IndexLifecycleManager {
    blobs: ChunkedBlobStore,
    source: Arc<dyn IndexSource>,
    engine: Arc<EngineWorker>,
    index_key: String,
    index_sha256: Option<String>,
    state: watch::Sender<OfflineState>,
    cancel: watch::Sender<bool>,
    progress_tx: Mutex<Option<mpsc::UnboundedSender<DownloadProgress>>>,
    /// Serializes enable/disable
    op: tokio::sync::Mutex<()>,
}

impl IndexLifecycleManager {
    pub fn new(
        blobs: ChunkedBlobStore,
        source: Arc<dyn IndexSource>,
        engine: Arc<EngineWorker>,
        index_key: &str,
        index_sha256: Option<String>,
    ) -> Self {
        let (state, _) = watch::channel(OfflineState::default());
        let (cancel, _) = watch::channel(false);
        Self {
            blobs,
            source,
            engine,
            index_key: index_key.to_string(),
            index_sha256,
            state,
            cancel,
            progress_tx: Mutex::new(None),
            op: tokio::sync::Mutex::new(()),
        }
    }

    /// Forward detailed progress events to `tx`
    pub fn set_progress_channel(&self, tx: mpsc::UnboundedSender<DownloadProgress>) {
        *self.progress_tx.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
    }

    pub fn state(&self) -> OfflineState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<OfflineState> {
        self.state.subscribe()
    }

    pub fn engine(&self) -> &Arc<EngineWorker> {
        &self.engine
    }

    fn emit(&self, progress: DownloadProgress) {
        let guard = self.progress_tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(progress);
        }
    }

    fn set_progress(&self, fraction: f64) {
        self.state.send_modify(|s| {
            if fraction > s.index_bytes_progress {
                s.index_bytes_progress = fraction.min(1.0);
            }
        });
    }

    /// Turn offline mode on.
    ///
    /// Uses the persisted index when present, otherwise downloads it. On
    /// failure partial data is deleted, progress resets to 0 and `error` is
    /// raised; the error is also returned. `loading` is cleared on every
    /// path.
    pub async fn enable(&self) -> Result<(), ClientError> {
        let _op = self.op.lock().await;

        self.state.send_modify(|s| s.enabled = true);
        if self.state.borrow().initialized {
            info!("Offline index already initialized");
            return Ok(());
        }

        self.cancel.send_replace(false);
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = false;
        });

        let mut persisted_len = None;
        let result = self.load_and_init(&mut persisted_len).await;

        match &result {
            Ok(()) => {
                self.state.send_modify(|s| {
                    s.initialized = true;
                    s.index_bytes_progress = 1.0;
                });
                self.emit(DownloadProgress::new(DownloadState::Completed, 0, 0));
                info!("Offline mode ready");
            }
            Err(e) => {
                let cancelled = matches!(e, ClientError::Cancelled);
                if cancelled {
                    info!("Index download cancelled");
                } else {
                    error!("Failed to enable offline mode: {}", e);
                }

                self.discard_partial(persisted_len).await;
                self.state.send_modify(|s| {
                    s.index_bytes_progress = 0.0;
                    s.initialized = false;
                    s.error = !cancelled;
                    if cancelled {
                        s.enabled = false;
                    }
                });
                let state = if cancelled {
                    DownloadState::Cancelled
                } else {
                    DownloadState::Failed
                };
                self.emit(DownloadProgress::new(state, 0, 0));
            }
        }

        self.state.send_modify(|s| s.loading = false);
        result
    }

    async fn load_and_init(&self, persisted_len: &mut Option<usize>) -> Result<(), ClientError> {
        let bytes = match self.blobs.get_large(&self.index_key).await? {
            Some(bytes) => {
                info!(bytes = bytes.len(), "Using persisted index");
                self.set_progress(1.0);
                bytes
            }
            None => {
                let bytes = download_index(
                    self.source.as_ref(),
                    self.index_sha256.as_deref(),
                    &self.cancel.subscribe(),
                    |progress| {
                        self.set_progress(progress.fraction());
                        self.emit(progress);
                    },
                )
                .await
                .map_err(|e| {
                    if e.downcast_ref::<DownloadCancelled>().is_some() {
                        ClientError::Cancelled
                    } else {
                        ClientError::Download(format!("{:#}", e))
                    }
                })?;

                let total = bytes.len() as u64;
                self.emit(DownloadProgress::new(DownloadState::Persisting, total, total));
                *persisted_len = Some(bytes.len());
                self.blobs.set_large(&self.index_key, &bytes).await?;
                bytes
            }
        };

        if *self.cancel.borrow() {
            return Err(ClientError::Cancelled);
        }

        let total = bytes.len() as u64;
        self.emit(DownloadProgress::new(DownloadState::Initializing, total, total));
        self.engine.init(bytes).await
    }

    async fn discard_partial(&self, persisted_len: Option<usize>) {
        if let Err(e) = self.blobs.del_large(&self.index_key).await {
            warn!("Failed to delete index after failure: {}", e);
        }
        if let Some(len) = persisted_len {
            if let Err(e) = self.blobs.del_chunks(&self.index_key, len).await {
                warn!("Failed to delete orphaned index chunks: {}", e);
            }
        }
    }

    /// Turn offline mode off and delete the persisted index.
    ///
    /// A running download is abandoned first. The engine keeps any index it
    /// already loaded, so re-enabling in the same session needs no download.
    pub async fn disable(&self) -> Result<(), ClientError> {
        self.cancel.send_replace(true);
        let _op = self.op.lock().await;

        self.state.send_modify(|s| {
            s.enabled = false;
            s.index_bytes_progress = 0.0;
        });
        self.blobs.del_large(&self.index_key).await?;
        info!("Offline mode disabled, index deleted");
        Ok(())
    }

    /// Abandon a running download. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        let running = self.state.borrow().loading;
        if running {
            self.cancel.send_replace(true);
        }
        running
    }

    /// Re-enable offline mode at startup when a persisted index exists.
    /// Never touches the network. Returns whether offline mode was enabled.
    pub async fn restore(&self) -> Result<bool, ClientError> {
        if !self.blobs.contains(&self.index_key).await? {
            return Ok(false);
        }
        self.enable().await?;
        Ok(true)
    }
}
