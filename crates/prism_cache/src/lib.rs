//! Pluggable key/value stores for materialized query results.
//!
//! Every backend implements [`CacheBackend`], keyed by [`ContentHash`]. The
//! kernel only talks to the trait, so the default [`LruBackend`] can be
//! replaced by an [`UnboundedBackend`] or a [`NoopBackend`] without changing
//! query logic.
//!
//! [`ContentHash`]: prism_common::ContentHash

#![warn(missing_docs)]

mod backend;
mod bounded;
mod error;
mod memory;

pub use backend::{BackendStats, CacheBackend};
pub use bounded::LruBackend;
pub use error::CacheError;
pub use memory::{NoopBackend, UnboundedBackend};
