//! TOML configuration file parsing.

use anyhow::Result;
use std::path::Path;

use crate::core::BuildError;

/// Read and deserialize a TOML file.
///
/// Both read and parse failures are reported as [`BuildError::ConfigError`] naming
/// the file, so the CLI can attach a suggestion.
pub fn parse_config<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let content = std::fs::read_to_string(path).map_err(|err| BuildError::ConfigError {
        message: format!("Failed to read {}: {err}", path.display()),
    })?;

    let config: T = toml::from_str(&content).map_err(|err| BuildError::ConfigError {
        message: format!("Failed to parse {}: {err}", path.display()),
    })?;

    Ok(config)
}
