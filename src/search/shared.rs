//! A search index handle that many readers share and one writer can swap.

use std::sync::{Arc, RwLock};

use tracing::info;

use crate::error::SearchResult;

use super::{Bm25Params, SearchDocument, SearchHit, SearchIndex};

/// Shared, atomically replaceable [`SearchIndex`].
///
/// Readers take a snapshot `Arc` and query it without holding the lock, so a
/// rebuild never blocks in-flight queries and a query never sees a half-built
/// index.
#[derive(Debug)]
pub struct SharedIndex {
    current: RwLock<Arc<SearchIndex>>,
}

impl SharedIndex {
    pub fn new(index: SearchIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// The index as of now.
    pub fn snapshot(&self) -> Arc<SearchIndex> {
        Arc::clone(&self.current.read().expect("search index lock poisoned"))
    }

    /// Swap in a new index.
    pub fn replace(&self, index: SearchIndex) {
        *self.current.write().expect("search index lock poisoned") = Arc::new(index);
    }

    /// Build a new index off-lock and swap it in. On failure the current
    /// index stays in place.
    pub fn rebuild(&self, documents: Vec<SearchDocument>, params: Bm25Params) -> SearchResult<()> {
        let index = SearchIndex::build(documents, params)?;
        let count = index.len();
        self.replace(index);
        info!(documents = count, "search index rebuilt");
        Ok(())
    }

    pub fn search(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        self.snapshot().search(query, top_k)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

impl Default for SharedIndex {
    fn default() -> Self {
        Self::new(SearchIndex::empty())
    }
}
