use crate::config::{StageConfig, extract_param, require_param};
use crate::core::chunk::RecordChunk;
use crate::processors::processor::{Emitted, Processor};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

/// Extracts new fields from a string field using the pattern's named
/// capture groups. Records that do not match pass through unchanged.
#[derive(Debug)]
pub struct RexProcessor {
    field: String,
    pattern: Regex,
    groups: Vec<String>,
}

impl RexProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        let field = extract_param(&config.parameters, "field", "_raw".to_string());
        let pattern: String = require_param(&config.parameters, "pattern")?;

        let pattern = Regex::new(&pattern)
            .with_context(|| format!("invalid rex pattern '{pattern}'"))?;

        let groups: Vec<String> = pattern
            .capture_names()
            .flatten()
            .map(str::to_string)
            .collect();
        if groups.is_empty() {
            bail!("rex pattern must define at least one named capture group");
        }

        Ok(Self { field, pattern, groups })
    }
}

#[async_trait]
impl Processor for RexProcessor {
    async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted> {
        let Some(mut chunk) = input else {
            return Ok(Emitted::Done(None));
        };

        for record in chunk.records_mut() {
            let Some(Value::String(text)) = record.get(&self.field) else { continue };

            let Some(captures) = self.pattern.captures(text) else { continue };
            let extracted: Vec<(String, String)> = self
                .groups
                .iter()
                .filter_map(|group| {
                    captures
                        .name(group)
                        .map(|m| (group.clone(), m.as_str().to_string()))
                })
                .collect();

            for (group, value) in extracted {
                record.set(&group, Value::String(value))?;
            }
        }

        Ok(Emitted::More(Some(chunk)))
    }

    fn rewind(&mut self) {}
}
