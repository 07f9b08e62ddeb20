//! Leaf producers: the streams that feed the first pipeline stage.

pub mod memory;
pub mod ndjson;
pub mod simulated;

pub use memory::ChunkSource;
pub use ndjson::NdjsonSource;
pub use simulated::SimulatedSource;

use crate::config::StageConfig;
use crate::core::stream::RecordStream;
use anyhow::{Context, Result};

/// Create a leaf producer from an input configuration.
pub fn create_source(name: &str, config: &StageConfig) -> Result<Box<dyn RecordStream>> {
    let source: Box<dyn RecordStream> = match config.r#type.as_str() {
        "ndjson" => Box::new(
            NdjsonSource::from_config(config)
                .with_context(|| format!("input '{name}'"))?,
        ),
        "simulated" => Box::new(
            SimulatedSource::from_config(config)
                .with_context(|| format!("input '{name}'"))?,
        ),
        other => anyhow::bail!("input '{name}' has unknown type '{other}'"),
    };

    Ok(source)
}
