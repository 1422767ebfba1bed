//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::{BackendKind, KernelConfig};
use std::path::Path;

/// File name looked up by [`load_config`].
pub const CONFIG_FILE_NAME: &str = "prism.toml";

/// Loads and validates a `prism.toml` configuration from a directory.
pub fn load_config(dir: &Path) -> Result<KernelConfig, ConfigError> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `prism.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<KernelConfig, ConfigError> {
    let config: KernelConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that configuration values are usable.
fn validate_config(config: &KernelConfig) -> Result<(), ConfigError> {
    if config.cache.backend == BackendKind::Lru && config.cache.max_size == 0 {
        return Err(ConfigError::ValidationError(
            "cache.max_size must be at least 1 for the lru backend".to_string(),
        ));
    }
    if let Some(step) = config.intern.float_quantization_step {
        if !step.is_finite() || step <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "intern.float_quantization_step must be a positive finite number, got {step}"
            )));
        }
    }
    Ok(())
}
