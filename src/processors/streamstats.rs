use crate::config::{StageConfig, extract_param};
use crate::core::chunk::RecordChunk;
use crate::core::record::Record;
use crate::processors::common::aggregates::{
    Accumulator, AggregateSpec, new_accumulators, observe_all, parse_aggregates,
};
use crate::processors::processor::{Emitted, Processor};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Running aggregates: each record is annotated with the aggregate
/// values over everything seen so far (within its group), which makes
/// the output depend on input order.
pub struct StreamstatsProcessor {
    specs: Vec<AggregateSpec>,
    group_by: Vec<String>,
    groups: HashMap<String, Vec<Accumulator>>,
}

impl StreamstatsProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        Ok(Self {
            specs: parse_aggregates(&config.parameters)?,
            group_by: extract_param(&config.parameters, "group_by", Vec::new()),
            groups: HashMap::new(),
        })
    }

    fn key_of(&self, record: &Record) -> String {
        self.group_by
            .iter()
            .map(|field| record.get(field).unwrap_or(&Value::Null).to_string())
            .collect::<Vec<_>>()
            .join("\u{1f}")
    }
}

#[async_trait]
impl Processor for StreamstatsProcessor {
    async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted> {
        let Some(mut chunk) = input else {
            return Ok(Emitted::Done(None));
        };

        for record in chunk.records_mut() {
            let key = self.key_of(record);
            let accumulators = self
                .groups
                .entry(key)
                .or_insert_with(|| new_accumulators(&self.specs));

            observe_all(&self.specs, accumulators, record);
            for (spec, accumulator) in self.specs.iter().zip(accumulators.iter()) {
                record.set(&spec.output_name(), accumulator.finish())?;
            }
        }

        Ok(Emitted::More(Some(chunk)))
    }

    fn rewind(&mut self) {
        self.groups.clear();
    }
}
