//! Application state management

use crate::api::{HttpSearchApi, RemoteSearch};
use crate::cache::{QueryCache, QueryRecord};
use crate::config::ClientConfig;
use crate::dispatcher::{Dispatched, SearchDispatcher};
use crate::downloader::{HttpIndexSource, IndexSource};
use crate::engine::{EngineWorker, SearchEngine};
use crate::error::ClientError;
use crate::lifecycle::{IndexLifecycleManager, OfflineState};
use crate::store::chunked::ChunkedBlobStore;
use crate::store::{KeyValueStore, SqliteStore};
use crate::verse::{VerseBody, VerseIdentity};
use std::sync::Arc;
use tracing::info;

/// Application state holding the search services and the offline index
pub struct AppState {
    pub config: ClientConfig,
    cache: Arc<QueryCache>,
    dispatcher: SearchDispatcher,
    lifecycle: Arc<IndexLifecycleManager>,
}

impl AppState {
    /// Wire the services together. Must be called from within a Tokio
    /// runtime, which hosts the engine worker's event routing.
    pub fn new<E: SearchEngine>(
        config: ClientConfig,
        store: Arc<dyn KeyValueStore>,
        api: Arc<dyn RemoteSearch>,
        source: Arc<dyn IndexSource>,
        engine: E,
    ) -> Result<Self, ClientError> {
        config.validate()?;

        let cache = Arc::new(QueryCache::new());
        let worker = Arc::new(EngineWorker::spawn(engine, Arc::clone(&cache))?);
        let dispatcher = SearchDispatcher::new(Arc::clone(&cache), api, Arc::clone(&worker));
        let lifecycle = Arc::new(IndexLifecycleManager::new(
            ChunkedBlobStore::new(store),
            source,
            worker,
            &config.index_key,
            config.index_sha256.clone(),
        ));

        Ok(Self {
            config,
            cache,
            dispatcher,
            lifecycle,
        })
    }

    /// HTTP search API, HTTP index source and a SQLite store under
    /// `config.data_dir`
    pub fn open_default<E: SearchEngine>(config: ClientConfig, engine: E) -> Result<Self, ClientError> {
        config.validate()?;
        let store_path = config.store_path();
        info!("Opening client state, store at {:?}", store_path);

        let store = Arc::new(SqliteStore::open(&store_path, config.max_entry_bytes)?);
        let api = Arc::new(HttpSearchApi::new(&config)?);
        let source = Arc::new(HttpIndexSource::new(&config)?);
        Self::new(config, store, api, source, engine)
    }

    /// Search `q` using the offline engine when it is ready, the remote API
    /// otherwise
    pub fn search(&self, q: &str) -> Dispatched {
        self.dispatcher.dispatch(q, &self.lifecycle.state())
    }

    /// Best available results for the latest query
    pub fn current_results(&self) -> Option<QueryRecord> {
        self.dispatcher.current_results()
    }

    pub fn verse_body(&self, id: &VerseIdentity) -> Option<Arc<VerseBody>> {
        self.cache.body(id)
    }

    pub fn offline_state(&self) -> OfflineState {
        self.lifecycle.state()
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn dispatcher(&self) -> &SearchDispatcher {
        &self.dispatcher
    }

    /// Shared so enable/disable can run on their own task
    pub fn lifecycle(&self) -> &Arc<IndexLifecycleManager> {
        &self.lifecycle
    }
}
