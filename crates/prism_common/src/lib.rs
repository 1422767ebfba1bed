//! Shared foundational types for the prism configuration kernel.
//!
//! This crate provides the configuration [`Value`] model, fixed-length
//! [`ContentHash`] identifiers, and the content addresser that turns any value
//! into a canonical hash for cache keys and interning.

#![warn(missing_docs)]

pub mod address;
pub mod hash;
pub mod value;

pub use address::{address, address_map, address_record};
pub use hash::{ContentHash, ContentHasher, HashAlgorithm};
pub use value::{Key, Map, Params, Value, ValueKind};
