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

/// Grouped aggregation over the whole input. On drain, emits one record
/// per group in first-seen order; without `group_by` it emits exactly
/// one record, even over empty input.
pub struct StatsProcessor {
    specs: Vec<AggregateSpec>,
    group_by: Vec<String>,

    order: Vec<String>,
    groups: HashMap<String, Group>,
}

struct Group {
    key_values: Vec<Value>,
    accumulators: Vec<Accumulator>,
}

impl StatsProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        Ok(Self {
            specs: parse_aggregates(&config.parameters)?,
            group_by: extract_param(&config.parameters, "group_by", Vec::new()),
            order: Vec::new(),
            groups: HashMap::new(),
        })
    }

    fn observe(&mut self, record: &Record) {
        let key_values: Vec<Value> = self
            .group_by
            .iter()
            .map(|field| record.get(field).cloned().unwrap_or(Value::Null))
            .collect();
        let key = key_values
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join("\u{1f}");

        let group = self.groups.entry(key.clone()).or_insert_with(|| {
            self.order.push(key);
            Group { key_values, accumulators: new_accumulators(&self.specs) }
        });
        observe_all(&self.specs, &mut group.accumulators, record);
    }

    fn drain(&mut self) -> Result<RecordChunk> {
        if self.groups.is_empty() && self.group_by.is_empty() {
            // stats over nothing still answers: count = 0, avg = null.
            let mut record = Record::new();
            let accumulators = new_accumulators(&self.specs);
            for (spec, accumulator) in self.specs.iter().zip(&accumulators) {
                record.set(&spec.output_name(), accumulator.finish())?;
            }
            return Ok([record].into_iter().collect());
        }

        let mut chunk = RecordChunk::new();
        for key in self.order.drain(..) {
            let group = self.groups.remove(&key).expect("group for ordered key");

            let mut record = Record::new();
            for (field, value) in self.group_by.iter().zip(group.key_values) {
                record.set(field, value)?;
            }
            for (spec, accumulator) in self.specs.iter().zip(&group.accumulators) {
                record.set(&spec.output_name(), accumulator.finish())?;
            }
            chunk.push(record);
        }

        Ok(chunk)
    }
}

#[async_trait]
impl Processor for StatsProcessor {
    async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted> {
        match input {
            Some(chunk) => {
                for record in chunk.iter() {
                    self.observe(record);
                }
                Ok(Emitted::More(None))
            }
            None => {
                let chunk = self.drain()?;
                Ok(Emitted::Done((!chunk.is_empty()).then_some(chunk)))
            }
        }
    }

    fn rewind(&mut self) {
        self.order.clear();
        self.groups.clear();
    }
}
