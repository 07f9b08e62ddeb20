use crate::config::{StageConfig, extract_param, require_param};
use crate::core::chunk::RecordChunk;
use crate::core::record::Record;
use crate::processors::processor::{Emitted, Processor};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Number, Value};
use std::collections::HashMap;

/// Frequency table over one or more fields, shared by `top` and `rare`.
/// Records missing every counted field are ignored.
struct FrequencyCounter {
    fields: Vec<String>,
    counts: HashMap<String, (Vec<Value>, u64)>,
    total: u64,
}

impl FrequencyCounter {
    fn from_config(config: &StageConfig) -> Result<Self> {
        let fields: Vec<String> = require_param(&config.parameters, "fields")?;
        if fields.is_empty() {
            anyhow::bail!("'fields' must name at least one field");
        }

        Ok(Self { fields, counts: HashMap::new(), total: 0 })
    }

    fn observe(&mut self, record: &Record) {
        if !self.fields.iter().any(|field| record.contains(field)) {
            return;
        }

        let values: Vec<Value> = self
            .fields
            .iter()
            .map(|field| record.get(field).cloned().unwrap_or(Value::Null))
            .collect();
        let key = values.iter().map(Value::to_string).collect::<Vec<_>>().join("\u{1f}");

        self.counts.entry(key).or_insert((values, 0)).1 += 1;
        self.total += 1;
    }

    /// Emit the `limit` most (or least) frequent combinations. Ties
    /// break on the key text, so output is deterministic.
    fn drain(&mut self, ascending: bool, limit: usize) -> Result<RecordChunk> {
        let total = self.total;
        let mut entries: Vec<(String, (Vec<Value>, u64))> = self.counts.drain().collect();
        self.total = 0;

        entries.sort_by(|(key_a, (_, count_a)), (key_b, (_, count_b))| {
            let by_count = match ascending {
                false => count_b.cmp(count_a),
                true => count_a.cmp(count_b),
            };
            by_count.then_with(|| key_a.cmp(key_b))
        });
        entries.truncate(limit);

        let mut chunk = RecordChunk::new();
        for (_, (values, count)) in entries {
            let mut record = Record::new();
            for (field, value) in self.fields.iter().zip(values) {
                record.set(field, value)?;
            }
            record.set("count", Value::from(count))?;

            let percent = (count as f64 / total as f64 * 100.0 * 1e6).round() / 1e6;
            record.set(
                "percent",
                Number::from_f64(percent).map(Value::Number).unwrap_or(Value::Null),
            )?;
            chunk.push(record);
        }

        Ok(chunk)
    }

    fn clear(&mut self) {
        self.counts.clear();
        self.total = 0;
    }
}

/// Most frequent field combinations, descending, with `count` and
/// `percent` columns.
pub struct TopProcessor {
    counter: FrequencyCounter,
    limit: usize,
}

impl TopProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        Ok(Self {
            counter: FrequencyCounter::from_config(config)?,
            limit: extract_param(&config.parameters, "limit", 10usize),
        })
    }
}

#[async_trait]
impl Processor for TopProcessor {
    async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted> {
        match input {
            Some(chunk) => {
                for record in chunk.iter() {
                    self.counter.observe(record);
                }
                Ok(Emitted::More(None))
            }
            None => {
                let chunk = self.counter.drain(false, self.limit)?;
                Ok(Emitted::Done((!chunk.is_empty()).then_some(chunk)))
            }
        }
    }

    fn rewind(&mut self) {
        self.counter.clear();
    }
}

/// Least frequent field combinations, ascending.
pub struct RareProcessor {
    counter: FrequencyCounter,
    limit: usize,
}

impl RareProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        Ok(Self {
            counter: FrequencyCounter::from_config(config)?,
            limit: extract_param(&config.parameters, "limit", 10usize),
        })
    }
}

#[async_trait]
impl Processor for RareProcessor {
    async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted> {
        match input {
            Some(chunk) => {
                for record in chunk.iter() {
                    self.counter.observe(record);
                }
                Ok(Emitted::More(None))
            }
            None => {
                let chunk = self.counter.drain(true, self.limit)?;
                Ok(Emitted::Done((!chunk.is_empty()).then_some(chunk)))
            }
        }
    }

    fn rewind(&mut self) {
        self.counter.clear();
    }
}
