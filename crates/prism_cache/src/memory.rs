//! Backends without an eviction policy.

use std::collections::HashMap;

use prism_common::ContentHash;

use crate::backend::{BackendStats, CacheBackend};

/// A plain hash map that never evicts.
///
/// Suitable when the set of distinct queries is known to be small.
pub struct UnboundedBackend<V> {
    entries: HashMap<ContentHash, V>,
}

impl<V> UnboundedBackend<V> {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V> Default for UnboundedBackend<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send> CacheBackend<V> for UnboundedBackend<V> {
    fn get(&mut self, key: &ContentHash) -> Option<V> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: ContentHash, value: V) {
        self.entries.insert(key, value);
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            kind: "unbounded",
            size: self.entries.len(),
            max_size: None,
            evictions: 0,
        }
    }
}

/// A backend that stores nothing. Every lookup misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBackend;

impl<V> CacheBackend<V> for NoopBackend {
    fn get(&mut self, _key: &ContentHash) -> Option<V> {
        None
    }

    fn set(&mut self, _key: ContentHash, _value: V) {}

    fn clear(&mut self) {}

    fn stats(&self) -> BackendStats {
        BackendStats {
            kind: "none",
            size: 0,
            max_size: Some(0),
            evictions: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_common::HashAlgorithm;

    fn key(n: u32) -> ContentHash {
        ContentHash::from_bytes(HashAlgorithm::Xxh3_128, &n.to_le_bytes())
    }

    #[test]
    fn unbounded_keeps_everything() {
        let mut cache = UnboundedBackend::new();
        for n in 0..1000 {
            cache.set(key(n), n);
        }
        assert_eq!(cache.len(), 1000);
        assert_eq!(cache.get(&key(0)), Some(0));
        assert_eq!(cache.stats().max_size, None);
    }

    #[test]
    fn unbounded_clear() {
        let mut cache = UnboundedBackend::new();
        cache.set(key(1), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn noop_always_misses() {
        let mut cache = NoopBackend;
        CacheBackend::<u32>::set(&mut cache, key(1), 1);
        assert_eq!(CacheBackend::<u32>::get(&mut cache, &key(1)), None);
        assert_eq!(CacheBackend::<u32>::stats(&cache).kind, "none");
    }

    #[test]
    fn boxed_backend_delegates() {
        let mut cache: Box<dyn CacheBackend<u32>> = Box::new(UnboundedBackend::new());
        cache.set(key(7), 7);
        assert_eq!(cache.get(&key(7)), Some(7));
        assert_eq!(cache.stats().kind, "unbounded");
    }

    #[test]
    fn stats_serialize() {
        let cache = UnboundedBackend::<u32>::new();
        let json = serde_json::to_value(cache.stats()).unwrap();
        assert_eq!(json["kind"], "unbounded");
        assert_eq!(json["size"], 0);
    }
}
