//! Per-query result cache with shared, de-duplicated verse bodies

use crate::verse::{VerseBody, VerseIdentity, VerseRef};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::debug;

/// State of one exact query string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRecord {
    pub key: String,
    /// True until the first response (or failure) arrives
    pub in_flight: bool,
    pub results: Vec<VerseRef>,
}

#[derive(Default)]
struct CacheInner {
    dirty: bool,
    queries: HashMap<String, QueryRecord>,
    bodies: HashMap<VerseIdentity, Arc<VerseBody>>,
}

/// Records are never evicted for the lifetime of the cache.
pub struct QueryCache {
    inner: Mutex<CacheInner>,
    revision: watch::Sender<u64>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Mutex::new(CacheInner::default()),
            revision,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    /// Create an in-flight record for `q` unless one already exists.
    ///
    /// Returns true when a record was created, i.e. the caller owns the one
    /// request allowed for `q`. Always marks the cache dirty.
    pub fn start_query(&self, q: &str) -> bool {
        let created = {
            let mut inner = self.lock();
            inner.dirty = true;
            if inner.queries.contains_key(q) {
                false
            } else {
                inner.queries.insert(
                    q.to_string(),
                    QueryRecord {
                        key: q.to_string(),
                        in_flight: true,
                        results: Vec::new(),
                    },
                );
                true
            }
        };
        debug!(query = q, created, "start_query");
        self.bump();
        created
    }

    /// Complete the record for `q`.
    ///
    /// `None` means the request failed: the record stops being in flight and
    /// keeps whatever results it had. Bodies are stored first-writer-wins.
    pub fn end_query(&self, q: &str, results: Option<Vec<(VerseRef, VerseBody)>>) {
        {
            let mut inner = self.lock();
            let CacheInner { queries, bodies, .. } = &mut *inner;
            let Some(record) = queries.get_mut(q) else {
                debug!(query = q, "end_query for unknown query ignored");
                return;
            };
            record.in_flight = false;

            if let Some(results) = results {
                let mut refs = Vec::with_capacity(results.len());
                for (verse_ref, body) in results {
                    bodies
                        .entry(verse_ref.id.clone())
                        .or_insert_with(|| Arc::new(body));
                    refs.push(verse_ref);
                }
                debug!(query = q, count = refs.len(), "end_query");
                record.results = refs;
            } else {
                debug!(query = q, "end_query without results");
            }
        }
        self.bump();
    }

    pub fn lookup_exact(&self, q: &str) -> Option<QueryRecord> {
        self.lock().queries.get(q).cloned()
    }

    pub fn body(&self, id: &VerseIdentity) -> Option<Arc<VerseBody>> {
        self.lock().bodies.get(id).cloned()
    }

    pub fn body_count(&self) -> usize {
        self.lock().bodies.len()
    }

    pub fn query_count(&self) -> usize {
        self.lock().queries.len()
    }

    /// Whether at least one search has been started this session
    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    pub fn is_loading(&self, q: &str) -> bool {
        self.lock().queries.get(q).is_some_and(|r| r.in_flight)
    }

    /// Revision counter bumped on every start/end
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Wait until the record for `q` exists and is no longer in flight
    pub async fn settled(&self, q: &str) -> Option<QueryRecord> {
        let mut rx = self.subscribe();
        let _ = rx
            .wait_for(|_| self.lookup_exact(q).is_some_and(|r| !r.in_flight))
            .await;
        self.lookup_exact(q)
    }
}
