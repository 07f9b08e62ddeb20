use crate::config::{StageConfig, extract_param, require_param};
use crate::core::chunk::RecordChunk;
use crate::processors::processor::{Emitted, Processor};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Splits a delimited string field into a multivalue (array) field.
pub struct MakemvProcessor {
    field: String,
    delim: String,
}

impl MakemvProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        let field: String = require_param(&config.parameters, "field")?;
        let delim = extract_param(&config.parameters, "delim", " ".to_string());
        if delim.is_empty() {
            anyhow::bail!("'delim' must not be empty");
        }

        Ok(Self { field, delim })
    }
}

#[async_trait]
impl Processor for MakemvProcessor {
    async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted> {
        let Some(mut chunk) = input else {
            return Ok(Emitted::Done(None));
        };

        for record in chunk.records_mut() {
            let Some(Value::String(text)) = record.get(&self.field) else { continue };

            let values: Vec<Value> = text
                .split(self.delim.as_str())
                .filter(|part| !part.is_empty())
                .map(|part| Value::String(part.to_string()))
                .collect();
            record.set(&self.field, Value::Array(values))?;
        }

        Ok(Emitted::More(Some(chunk)))
    }

    fn rewind(&mut self) {}
}
