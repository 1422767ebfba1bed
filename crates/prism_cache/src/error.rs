//! Error types for cache construction.

/// Errors that can occur when constructing a cache backend.
///
/// Lookups and stores never fail: a backend that cannot hold an entry simply
/// misses on the next lookup.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A bounded backend was asked for zero capacity.
    #[error("cache capacity must be at least 1, got {requested}")]
    ZeroCapacity {
        /// The capacity that was requested.
        requested: usize,
    },
}
