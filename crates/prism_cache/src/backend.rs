//! The backend contract shared by every cache implementation.

use prism_common::ContentHash;
use serde::Serialize;

/// Occupancy counters reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackendStats {
    /// Short name of the backend (`"lru"`, `"unbounded"`, `"none"`).
    pub kind: &'static str,
    /// Number of entries currently stored.
    pub size: usize,
    /// Maximum number of entries, or `None` when unbounded.
    pub max_size: Option<usize>,
    /// Entries dropped to make room since construction.
    pub evictions: u64,
}

/// A key/value store for cached results.
///
/// Implementations may drop entries at any time according to their eviction
/// policy; callers must treat every lookup as possibly missing. Values are
/// returned by clone, so `V` should be cheap to clone.
pub trait CacheBackend<V>: Send {
    /// Looks up a key. A hit may update the backend's recency bookkeeping.
    fn get(&mut self, key: &ContentHash) -> Option<V>;

    /// Stores a value, replacing any existing entry for `key`.
    fn set(&mut self, key: ContentHash, value: V);

    /// Removes every entry. Eviction counters are left untouched.
    fn clear(&mut self);

    /// Returns occupancy counters.
    fn stats(&self) -> BackendStats;

    /// Number of entries currently stored.
    fn len(&self) -> usize {
        self.stats().size
    }

    /// Returns `true` if nothing is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V, B: CacheBackend<V> + ?Sized> CacheBackend<V> for Box<B> {
    fn get(&mut self, key: &ContentHash) -> Option<V> {
        (**self).get(key)
    }

    fn set(&mut self, key: ContentHash, value: V) {
        (**self).set(key, value)
    }

    fn clear(&mut self) {
        (**self).clear()
    }

    fn stats(&self) -> BackendStats {
        (**self).stats()
    }
}
