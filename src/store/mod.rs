//! Persistence and index adapters.
//!
//! [`SqliteStore`] is the shared backing store for documents, chunks,
//! embeddings, and the FTS5 index. Two thin adapters give the retrieval
//! pipeline its interfaces: [`VectorStore`] (similarity queries with a TTL
//! query cache) and [`LexicalIndex`] (BM25 with min-max normalized
//! scores).

pub mod schema;
pub mod sqlite;

pub use sqlite::{QueryFilter, SqliteStore, StoreStats};

use crate::cache::{TtlCache, content_key};
use crate::core::Chunk;
use crate::error::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared handle to the backing store.
pub type SharedStore = Arc<Mutex<SqliteStore>>;

/// Wraps a store handle in the shared type.
#[must_use]
pub fn shared(store: SqliteStore) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Runs a closure against the locked store.
///
/// # Errors
///
/// Returns a store error if the lock is poisoned or the closure fails.
pub fn with_store<T>(
    store: &SharedStore,
    f: impl FnOnce(&mut SqliteStore) -> Result<T>,
) -> Result<T> {
    let mut guard = store.lock().map_err(|_| {
        crate::error::StoreError::Database("store lock poisoned".to_string())
    })?;
    f(&mut guard)
}

/// Vector-store adapter: similarity queries with a short-TTL cache to
/// absorb duplicate queries.
pub struct VectorStore {
    store: SharedStore,
    cache: TtlCache<String, Vec<(String, f32)>>,
}

impl VectorStore {
    /// Creates the adapter with the given query-cache TTL.
    #[must_use]
    pub fn new(store: SharedStore, cache_ttl: Duration) -> Self {
        Self {
            store,
            cache: TtlCache::new(cache_ttl),
        }
    }

    /// Queries the store by vector similarity.
    ///
    /// Scores are normalized to [0, 1]. Results for the same
    /// (vector, `top_k`, filter) triple are served from cache within the
    /// TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying scan fails.
    pub fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<(String, f32)>> {
        let key = Self::cache_key(vector, top_k, filter);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }
        let results = with_store(&self.store, |s| s.query_similar(vector, top_k, filter))?;
        self.cache.insert(key, results.clone());
        Ok(results)
    }

    /// Fetches full chunks by ID, preserving order.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails.
    pub fn fetch(&self, chunk_ids: &[String]) -> Result<Vec<Chunk>> {
        with_store(&self.store, |s| s.fetch_chunks(chunk_ids))
    }

    /// Fetches a single chunk by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails.
    pub fn get(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        with_store(&self.store, |s| s.get_chunk(chunk_id))
    }

    /// Drops all cached query results (called after ingest).
    pub fn invalidate_cache(&self) {
        self.cache.clear();
    }

    fn cache_key(vector: &[f32], top_k: usize, filter: &QueryFilter) -> String {
        let mut bytes: Vec<u8> = vector.iter().flat_map(|f| f.to_le_bytes()).collect();
        bytes.extend_from_slice(&top_k.to_le_bytes());
        bytes.extend_from_slice(filter.cache_key_part().as_bytes());
        content_key(&bytes)
    }
}

/// Lexical (BM25) index adapter over the same chunk corpus.
pub struct LexicalIndex {
    store: SharedStore,
}

impl LexicalIndex {
    /// Creates the adapter.
    #[must_use]
    pub const fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Searches the BM25 index.
    ///
    /// Raw BM25 scores are min-max normalized within the returned set so
    /// they are comparable to vector scores in fusion.
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails.
    pub fn search(&self, query_text: &str, top_k: usize) -> Result<Vec<(String, f32)>> {
        let raw = with_store(&self.store, |s| s.search_fts(query_text, top_k))?;
        Ok(normalize_scores(&raw))
    }

    /// Rebuilds the index from the chunk corpus.
    ///
    /// # Errors
    ///
    /// Returns an error if the rebuild fails.
    pub fn rebuild(&self) -> Result<()> {
        with_store(&self.store, SqliteStore::rebuild_fts)
    }
}

/// Min-max normalizes scores into [0, 1] within the given set.
///
/// A single result (or a degenerate all-equal set) normalizes to 1.0.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn normalize_scores(raw: &[(String, f64)]) -> Vec<(String, f32)> {
    if raw.is_empty() {
        return Vec::new();
    }
    let min = raw.iter().map(|(_, s)| *s).fold(f64::INFINITY, f64::min);
    let max = raw.iter().map(|(_, s)| *s).fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    raw.iter()
        .map(|(id, score)| {
            let normalized = if range > f64::EPSILON {
                (score - min) / range
            } else {
                1.0
            };
            (id.clone(), normalized as f32)
        })
        .collect()
}
