//! Configuration types deserialized from `prism.toml`.

use prism_common::HashAlgorithm;
use serde::{Deserialize, Serialize};

/// Default number of entries held by the LRU backend.
pub const DEFAULT_CACHE_SIZE: usize = 1024;

/// The top-level kernel configuration parsed from `prism.toml`.
///
/// Every section is optional; a missing section takes its defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct KernelConfig {
    /// Cache backend selection and sizing.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Digest used for cache keys and pipeline fingerprints.
    #[serde(default)]
    pub hashing: HashingConfig,
    /// Settings for the built-in intern pass.
    #[serde(default)]
    pub intern: InternConfig,
}

/// Cache backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Which backend to construct.
    #[serde(default)]
    pub backend: BackendKind,
    /// Capacity of the `lru` backend. Ignored by the other backends.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            max_size: DEFAULT_CACHE_SIZE,
        }
    }
}

fn default_max_size() -> usize {
    DEFAULT_CACHE_SIZE
}

/// The cache backend implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Bounded least-recently-used cache (default).
    #[default]
    Lru,
    /// Hash map without eviction.
    Unbounded,
    /// No caching; every query recomputes.
    #[serde(rename = "none")]
    Disabled,
}

/// Hashing configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct HashingConfig {
    /// The digest algorithm (`"xxh3-128"` or `"blake3-256"`).
    #[serde(default)]
    pub algorithm: HashAlgorithm,
}

/// Intern pass configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InternConfig {
    /// Whether the kernel installs an intern pass at the front of its pipeline.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether the intern pass records hit/miss statistics.
    #[serde(default = "default_true")]
    pub collect_stats: bool,
    /// Bucket width for float deduplication. Floats within one step collapse
    /// to the same interned value. Unset means exact comparison.
    #[serde(default)]
    pub float_quantization_step: Option<f64>,
}

impl Default for InternConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collect_stats: true,
            float_quantization_step: None,
        }
    }
}

fn default_true() -> bool {
    true
}
