//! Configuration Validation Module
//!
//! Structural validation of a parsed [`Config`] before pipeline
//! construction begins. Parameter-level validation (regex syntax,
//! aggregate shapes, ...) happens later, inside each stage's
//! constructor; this pass only rejects configurations whose shape can
//! never build.
//!
//! # Validation Rules
//!
//! - The pipeline must have at least one stage, and every stage kind
//!   must exist in the stage catalog.
//! - Generator stages (`gentimes`) run over no input: they must come
//!   first in the chain, at most once, with no inputs configured.
//! - Every other pipeline needs at least one input, and more than one
//!   input requires an `order_by` merge ordering.
//! - Input and output kinds must be known. All shipped inputs are
//!   replayable, which is what lets two-pass stages (`bin` without a
//!   span, `fillnull` without a field list) rewind them between passes.

use crate::config::types::Config;
use crate::processors::factory;
use anyhow::{Result, bail};

const INPUT_KINDS: &[&str] = &["ndjson", "simulated"];
const OUTPUT_KINDS: &[&str] = &["ndjson"];

/// Validates the configuration for structural correctness.
pub fn validate_config(config: &Config) -> Result<()> {
    if config.pipeline.stages.is_empty() {
        bail!("pipeline has no stages");
    }

    for (index, stage) in config.pipeline.stages.iter().enumerate() {
        if !factory::stage_exists(&stage.r#type) {
            bail!("unknown stage type '{}' at position {index}", stage.r#type);
        }

        if stage.r#type == "gentimes" && index != 0 {
            bail!("'gentimes' generates records and must be the first stage");
        }
    }

    let generated = config.pipeline.stages[0].r#type == "gentimes";
    if generated {
        if !config.inputs.is_empty() {
            bail!("a 'gentimes' pipeline takes no inputs");
        }
    } else if config.inputs.is_empty() {
        bail!("pipeline has no inputs");
    }

    if config.inputs.len() > 1 && config.pipeline.order_by.is_empty() {
        bail!("multiple inputs require an 'order_by' merge ordering");
    }

    for (name, input) in &config.inputs {
        if !INPUT_KINDS.contains(&input.r#type.as_str()) {
            bail!("input '{name}' has unknown type '{}'", input.r#type);
        }
    }

    if let Some(output) = &config.output {
        if !OUTPUT_KINDS.contains(&output.r#type.as_str()) {
            bail!("unknown output type '{}'", output.r#type);
        }
    }

    Ok(())
}
