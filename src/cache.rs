//! Plain TTL key-value caches.
//!
//! Each cache is a flat map with a content-hash key and per-key atomic
//! writes; readers never block writers for long since entries are cloned
//! out. There is deliberately no layered cache abstraction on top.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// An in-process TTL cache.
///
/// Expired entries are dropped lazily on access and swept opportunistically
/// on insert once the map grows.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, (Instant, V)>>,
    ttl: Duration,
}

/// Sweep threshold: inserts past this size trigger an expiry sweep.
const SWEEP_THRESHOLD: usize = 1024;

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Creates a cache with the given time-to-live.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns the cached value for `key` if present and not expired.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let Ok(mut entries) = self.entries.lock() else {
            return None;
        };
        match entries.get(key) {
            Some((stored_at, value)) if stored_at.elapsed() <= self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Inserts a value, replacing any previous entry for the key.
    pub fn insert(&self, key: K, value: V) {
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() >= SWEEP_THRESHOLD {
                let ttl = self.ttl;
                entries.retain(|_, (stored_at, _)| stored_at.elapsed() <= ttl);
            }
            entries.insert(key, (Instant::now(), value));
        }
    }

    /// Number of live entries (expired entries may still be counted until
    /// swept).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops all entries.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

/// Hex-encoded SHA-256 digest of a byte slice, used as a content-hash
/// cache key throughout the crate.
#[must_use]
pub fn content_key(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
