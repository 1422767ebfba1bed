//! Parsing and validation of `prism.toml` kernel configuration files.
//!
//! This crate reads the kernel configuration and produces a strongly-typed
//! [`KernelConfig`] describing the cache backend, hash algorithm, and intern
//! pass settings.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE_NAME};
pub use types::*;
