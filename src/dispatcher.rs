//! Routes each search to the embedded engine or the remote API

use crate::api::RemoteSearch;
use crate::cache::{QueryCache, QueryRecord};
use crate::engine::EngineWorker;
use crate::lifecycle::OfflineState;
use crate::proto;
use crate::resolver::PrefixResolver;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What `dispatch` did with a query
#[derive(Debug)]
pub enum Dispatched {
    /// Blank query: nothing to search
    Ignored,
    /// A record already exists; its original request resolves it
    Duplicate,
    /// Queued on the embedded engine worker
    Engine,
    /// Remote request running on this task
    Remote(JoinHandle<()>),
}

pub struct SearchDispatcher {
    cache: Arc<QueryCache>,
    resolver: PrefixResolver,
    api: Arc<dyn RemoteSearch>,
    engine: Arc<EngineWorker>,
    current: Mutex<String>,
}

impl SearchDispatcher {
    pub fn new(cache: Arc<QueryCache>, api: Arc<dyn RemoteSearch>, engine: Arc<EngineWorker>) -> Self {
        Self {
            resolver: PrefixResolver::new(Arc::clone(&cache)),
            cache,
            api,
            engine,
            current: Mutex::new(String::new()),
        }
    }

    /// Start a search for `q` and make it the current query.
    ///
    /// At most one engine/network call is ever issued per exact query
    /// string. Failures are logged and complete the record with no results.
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, q: &str, offline: &OfflineState) -> Dispatched {
        let q = q.trim();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = q.to_string();

        if q.is_empty() {
            return Dispatched::Ignored;
        }

        if !self.cache.start_query(q) {
            debug!(query = q, "search already issued");
            return Dispatched::Duplicate;
        }

        if offline.enabled && offline.initialized {
            debug!(query = q, "searching offline");
            if let Err(e) = self.engine.search(q) {
                warn!(query = q, "Offline search could not be queued: {}", e);
                self.cache.end_query(q, None);
            }
            return Dispatched::Engine;
        }

        debug!(query = q, "searching online");
        let api = Arc::clone(&self.api);
        let cache = Arc::clone(&self.cache);
        let q = q.to_string();
        Dispatched::Remote(tokio::spawn(async move {
            let decoded = match api.search(&q).await {
                Ok(bytes) => proto::decode_response(&bytes),
                Err(e) => Err(e),
            };
            match decoded {
                Ok(results) => cache.end_query(&q, Some(results)),
                Err(e) => {
                    warn!(query = %q, "Search failed: {}", e);
                    cache.end_query(&q, None);
                }
            }
        }))
    }

    pub fn current_query(&self) -> String {
        self.current.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Best available results for the current query
    pub fn current_results(&self) -> Option<QueryRecord> {
        self.resolver.resolve(&self.current_query())
    }

    pub fn resolver(&self) -> &PrefixResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }
}
