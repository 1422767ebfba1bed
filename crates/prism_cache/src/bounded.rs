//! Size-bounded backend with least-recently-used eviction.

use std::num::NonZeroUsize;

use ::lru::LruCache;
use prism_common::ContentHash;

use crate::backend::{BackendStats, CacheBackend};
use crate::error::CacheError;

/// The default cache backend: holds at most `max_size` entries and evicts the
/// least recently used one when a new key arrives at capacity.
///
/// A successful [`get`](CacheBackend::get) promotes the key to most recently
/// used. Re-setting an existing key refreshes its recency and value without
/// changing the size.
pub struct LruBackend<V> {
    entries: LruCache<ContentHash, V>,
    evictions: u64,
}

impl<V> LruBackend<V> {
    /// Creates a backend holding at most `max_size` entries.
    pub fn new(max_size: usize) -> Result<Self, CacheError> {
        let cap = NonZeroUsize::new(max_size)
            .ok_or(CacheError::ZeroCapacity { requested: max_size })?;
        Ok(Self::with_capacity(cap))
    }

    /// Creates a backend from an already validated capacity.
    pub fn with_capacity(max_size: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(max_size),
            evictions: 0,
        }
    }

    /// Returns `true` if `key` is stored, without touching its recency.
    pub fn contains(&self, key: &ContentHash) -> bool {
        self.entries.contains(key)
    }

    /// The key that would be evicted next, if any.
    pub fn peek_lru(&self) -> Option<&ContentHash> {
        self.entries.peek_lru().map(|(k, _)| k)
    }
}

impl<V: Clone + Send> CacheBackend<V> for LruBackend<V> {
    fn get(&mut self, key: &ContentHash) -> Option<V> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: ContentHash, value: V) {
        if let Some((old_key, _)) = self.entries.push(key, value) {
            // `push` also hands back the previous value when the key was already present.
            if old_key != key {
                self.evictions += 1;
                tracing::trace!(evicted = %old_key, "cache.lru.evict");
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            kind: "lru",
            size: self.entries.len(),
            max_size: Some(self.entries.cap().get()),
            evictions: self.evictions,
        }
    }
}
