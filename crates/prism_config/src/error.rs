//! Errors raised while reading `prism.toml`.

/// Why a `prism.toml` could not be turned into a [`KernelConfig`](crate::KernelConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read prism.toml: {0}")]
    IoError(#[from] std::io::Error),

    /// The file is not valid TOML or does not match the expected schema.
    #[error("malformed prism.toml: {0}")]
    ParseError(String),

    /// The file parsed but holds a value the kernel cannot use.
    #[error("invalid prism.toml setting: {0}")]
    ValidationError(String),
}
