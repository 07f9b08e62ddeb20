//! Configuration Type Definitions
//!
//! Core configuration structures for logsieve. These types are
//! deserialised from TOML configuration files and used to construct the
//! search pipeline.

use serde::Deserialize;
use std::collections::HashMap;

/// Root configuration for one pipeline run.
///
/// # Example Structure
///
/// ```toml
/// [inputs.events]
/// type = "ndjson"
/// parameters = { path = "events.ndjson", chunk_size = 512 }
///
/// [pipeline]
/// description = "slow requests by service"
///
/// [[pipeline.stages]]
/// type = "where"
/// parameters = { expression = "latency_ms > 250" }
///
/// [[pipeline.stages]]
/// type = "stats"
/// parameters = { group_by = ["service"], aggregates = [{ function = "count" }] }
///
/// [output]
/// type = "ndjson"
/// parameters = { path = "-" }
/// ```
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Input source configurations, keyed by name. With more than one
    /// input, the pipeline's `order_by` comparator merges them; stream
    /// indices follow input name order.
    #[serde(default)]
    pub inputs: HashMap<String, StageConfig>,

    /// The stage chain to run.
    pub pipeline: PipelineConfig,

    /// Where drained records go. Defaults to NDJSON on stdout.
    #[serde(default)]
    pub output: Option<StageConfig>,
}

/// Configuration for the ordered chain of stages.
#[derive(Clone, Debug, Deserialize)]
pub struct PipelineConfig {
    /// Human-readable description of the pipeline's purpose.
    #[serde(default)]
    pub description: String,

    /// Merge ordering for multi-input pipelines: a list of field names,
    /// each optionally prefixed with `-` for descending order.
    #[serde(default)]
    pub order_by: Vec<String>,

    /// The stages, in execution order.
    pub stages: Vec<StageConfig>,
}

/// Configuration for a single input, stage, or output.
///
/// `parameters` is an open map so every stage kind can define its own
/// option surface; see `config::params` for typed extraction.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StageConfig {
    /// The kind to instantiate (e.g. "ndjson", "where", "stats").
    #[serde(rename = "type")]
    pub r#type: String,

    /// Kind-specific configuration parameters.
    pub parameters: Option<HashMap<String, serde_json::Value>>,
}
