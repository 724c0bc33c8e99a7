//! Nearest completed result set for a query that may still be typed

use crate::cache::{QueryCache, QueryRecord};
use std::sync::Arc;

/// Resolves a query to the longest prefix (itself included) whose record has
/// completed. Shows the closest finished results while the exact query is
/// still in flight.
#[derive(Clone)]
pub struct PrefixResolver {
    cache: Arc<QueryCache>,
}

impl PrefixResolver {
    pub fn new(cache: Arc<QueryCache>) -> Self {
        Self { cache }
    }

    /// Scan from the full query down to its first character; the empty
    /// prefix is never considered. `None` means nothing has completed yet.
    pub fn resolve(&self, q: &str) -> Option<QueryRecord> {
        prefixes_longest_first(q).find_map(|p| self.cache.lookup_exact(p).filter(|r| !r.in_flight))
    }
}

/// Non-empty prefixes of `q` at char boundaries, longest first
pub fn prefixes_longest_first(q: &str) -> impl Iterator<Item = &str> {
    q.char_indices()
        .map(|(i, c)| &q[..i + c.len_utf8()])
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
}
