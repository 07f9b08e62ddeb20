//! Parameter Extraction Module
//!
//! Utilities for extracting and converting stage parameters from the
//! generic `HashMap<String, serde_json::Value>` format used in stage
//! configurations.
//!
//! `extract_param` provides type-safe extraction with a fallback
//! default; the `None::<T>` default is the conventional way to probe an
//! optional parameter. `require_param` is for parameters a stage cannot
//! run without and produces the "missing required parameter" error that
//! construction surfaces to the user.

use anyhow::{Result, anyhow};
use std::collections::HashMap;

/// Extracts a typed parameter from the stage configuration parameters.
///
/// Uses Serde deserialisation for type safety: if the parameter is
/// missing, or exists but cannot be converted to the target type, the
/// default value is returned.
///
/// # Examples
///
/// ```rust
/// let chunk_size = extract_param(&config.parameters, "chunk_size", 1024usize);
/// let span = extract_param(&config.parameters, "span", None::<f64>);
/// ```
pub fn extract_param<T>(
    params: &Option<HashMap<String, serde_json::Value>>,
    key: &str,
    default: T,
) -> T
where
    T: serde::de::DeserializeOwned + Clone,
{
    params
        .as_ref()
        .and_then(|p| p.get(key))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or(default)
}

/// Extracts a parameter that must be present and well-typed.
pub fn require_param<T>(
    params: &Option<HashMap<String, serde_json::Value>>,
    key: &str,
) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let value = params
        .as_ref()
        .and_then(|p| p.get(key))
        .ok_or_else(|| anyhow!("missing required parameter '{key}'"))?;

    serde_json::from_value(value.clone())
        .map_err(|e| anyhow!("parameter '{key}' has the wrong shape: {e}"))
}
