//! Embedded search engine running on a dedicated worker thread
//!
//! The controller and the worker share no mutable state: commands and
//! events cross the boundary over channels. Search responses echo the query
//! string, so they can arrive in any order and each one is applied to the
//! cache independently.

use crate::cache::QueryCache;
use crate::error::ClientError;
use crate::proto::{self, Response};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Embedded search/ranking engine capability
pub trait SearchEngine: Send + 'static {
    /// Load an index blob. Fails on malformed index bytes.
    fn init(&mut self, index: &[u8]) -> anyhow::Result<()>;

    fn search(&self, q: &str) -> Response;
}

/// Controller to worker
#[derive(Debug)]
pub enum WorkerCommand {
    Init { bytes: Vec<u8> },
    Search { q: String },
}

/// Worker to controller
#[derive(Debug)]
pub enum WorkerEvent {
    Init { success: bool },
    /// `res` is an encoded [`Response`], or the reason no search ran
    Search { q: String, res: Result<Vec<u8>, String> },
}

/// Handle to the engine thread. Dropping it stops the thread once queued
/// commands have been processed.
pub struct EngineWorker {
    commands: mpsc::UnboundedSender<WorkerCommand>,
    pending_init: Arc<Mutex<Option<oneshot::Sender<bool>>>>,
}

impl EngineWorker {
    /// Start the worker thread and the task routing its events into `cache`.
    /// Must be called from within a Tokio runtime.
    pub fn spawn<E: SearchEngine>(engine: E, cache: Arc<QueryCache>) -> Result<Self, ClientError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ClientError::Other(format!("Engine worker needs a Tokio runtime: {}", e)))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let pending_init: Arc<Mutex<Option<oneshot::Sender<bool>>>> = Arc::new(Mutex::new(None));

        thread::Builder::new()
            .name("versearch-engine".to_string())
            .spawn(move || run_worker(engine, command_rx, event_tx))
            .map_err(|e| ClientError::Other(format!("Failed to start engine thread: {}", e)))?;

        runtime.spawn(route_events(event_rx, cache, Arc::clone(&pending_init)));

        Ok(Self {
            commands: command_tx,
            pending_init,
        })
    }

    /// Hand index bytes to the engine and wait for its verdict
    pub async fn init(&self, bytes: Vec<u8>) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        *self.pending_init.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);

        self.commands
            .send(WorkerCommand::Init { bytes })
            .map_err(|_| ClientError::EngineInit("Engine worker has stopped".to_string()))?;

        match rx.await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ClientError::EngineInit("Engine rejected the index".to_string())),
            Err(_) => Err(ClientError::EngineInit("Init superseded or worker stopped".to_string())),
        }
    }

    /// Queue a search. The result lands in the cache when the worker answers.
    pub fn search(&self, q: &str) -> Result<(), ClientError> {
        self.commands
            .send(WorkerCommand::Search { q: q.to_string() })
            .map_err(|_| ClientError::NotReady("Engine worker has stopped".to_string()))
    }
}

fn run_worker<E: SearchEngine>(
    mut engine: E,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let mut initialized = false;

    while let Some(command) = commands.blocking_recv() {
        let event = match command {
            WorkerCommand::Init { bytes } => {
                let outcome = catch_unwind(AssertUnwindSafe(|| engine.init(&bytes)));
                let success = match outcome {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        warn!("Engine init failed: {:#}", e);
                        false
                    }
                    Err(_) => {
                        error!("Engine panicked during init");
                        false
                    }
                };
                initialized = success;
                info!(success, bytes = bytes.len(), "engine init");
                WorkerEvent::Init { success }
            }
            WorkerCommand::Search { q } => {
                let res = if !initialized {
                    Err("Engine not initialized".to_string())
                } else {
                    catch_unwind(AssertUnwindSafe(|| engine.search(&q)))
                        .map(|response| proto::encode_response(&response))
                        .map_err(|_| "Engine panicked during search".to_string())
                };
                WorkerEvent::Search { q, res }
            }
        };

        if events.send(event).is_err() {
            break;
        }
    }

    debug!("Engine worker stopped");
}

async fn route_events(
    mut events: mpsc::UnboundedReceiver<WorkerEvent>,
    cache: Arc<QueryCache>,
    pending_init: Arc<Mutex<Option<oneshot::Sender<bool>>>>,
) {
    while let Some(event) = events.recv().await {
        match event {
            WorkerEvent::Init { success } => {
                let waiter = pending_init.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(tx) = waiter {
                    let _ = tx.send(success);
                }
            }
            WorkerEvent::Search { q, res } => {
                let decoded = res
                    .map_err(ClientError::Other)
                    .and_then(|bytes| proto::decode_response(&bytes));
                match decoded {
                    Ok(results) => cache.end_query(&q, Some(results)),
                    Err(e) => {
                        warn!(query = %q, "Offline search failed: {}", e);
                        cache.end_query(&q, None);
                    }
                }
            }
        }
    }
}
