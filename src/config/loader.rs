//! Configuration Loader Module
//!
//! Loads logsieve configuration from TOML. Loading and structural
//! validation are separate steps: `load_config` only parses; callers
//! run `validate_config` before handing the result to the pipeline
//! builder.

use crate::config::types::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;

    toml::from_str(&content)
        .with_context(|| format!("failed to parse config file '{}'", path.display()))
}

/// Loads configuration from a TOML string.
///
/// Useful for tests, embedded defaults, and configuration coming from
/// non-file sources.
pub fn load_config_from_string(content: &str) -> Result<Config> {
    toml::from_str(content).context("failed to parse configuration")
}
