//! Versearch - verse search client core
//!
//! Query cache, search dispatch between a remote API and an embedded
//! engine, and the offline index lifecycle.

pub mod verse;
pub mod proto;
pub mod highlight;
pub mod error;
pub mod config;
pub mod cache;
pub mod resolver;
pub mod api;
pub mod engine;
pub mod dispatcher;
pub mod store;
pub mod downloader;
pub mod lifecycle;
pub mod state;

pub use error::{ClientError, StoreError};
pub use config::ClientConfig;
pub use state::AppState;
pub use verse::{book_name, VerseBody, VerseIdentity, VerseKey, VerseRef};
pub use highlight::{highlight, Chunk};
pub use cache::{QueryCache, QueryRecord};
pub use resolver::PrefixResolver;
pub use api::{HttpSearchApi, RemoteSearch};
pub use engine::{EngineWorker, SearchEngine, WorkerCommand, WorkerEvent};
pub use dispatcher::{Dispatched, SearchDispatcher};
pub use store::chunked::{ChunkedBlobStore, CHUNK_SIZE};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use downloader::{
    download_index, verify_sha256, ByteStream, DownloadProgress, DownloadState, HttpIndexSource,
    IndexSource,
};
pub use lifecycle::{IndexLifecycleManager, IndexPhase, OfflineState};
