//! Error types for kernel registration, compilation, and queries.

use prism_cache::CacheError;
use prism_common::ContentHash;

/// Failure type returned by passes and view materializers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the [`Kernel`](crate::Kernel).
///
/// None of these leave the kernel in an inconsistent state: a failed query
/// caches nothing and the next query proceeds normally. The kernel never
/// retries on its own.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// The requested view key is not registered.
    #[error("view '{view}' not found (registered views: [{}])", .known.join(", "))]
    ViewNotFound {
        /// The key that was requested.
        view: String,
        /// Every registered view key, sorted.
        known: Vec<String>,
    },

    /// Compiling the configuration or materializing the view failed.
    #[error("materialization of view '{view}' failed: {source}")]
    MaterializationFailed {
        /// The view being materialized.
        view: String,
        /// The error raised by the pass or the materializer.
        #[source]
        source: BoxError,
    },

    /// A pass failed while compiling a configuration.
    #[error("pass '{pass}' failed: {source}")]
    CompileFailed {
        /// Name of the failing pass.
        pass: String,
        /// The error raised by the pass.
        #[source]
        source: BoxError,
    },

    /// A view with the same key was already registered.
    #[error("view '{0}' is already registered")]
    DuplicateView(String),

    /// A compiled configuration was produced by a different pass pipeline
    /// than the one the kernel currently runs.
    #[error("compiled configuration is stale: built by pipeline {found}, kernel runs {expected}")]
    StalePipeline {
        /// The kernel's current pipeline fingerprint.
        expected: ContentHash,
        /// The fingerprint recorded in the compiled configuration.
        found: ContentHash,
    },

    /// The cache backend could not be constructed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}
