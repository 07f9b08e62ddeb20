use crate::config::{StageConfig, extract_param};
use crate::core::chunk::RecordChunk;
use crate::core::record::Record;
use crate::processors::common::aggregates::{
    Accumulator, AggregateSpec, new_accumulators, observe_all, parse_aggregates,
};
use crate::processors::processor::{Emitted, Processor};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// Time-bucketed aggregation. On drain, emits one record per bucket in
/// ascending time order. With `group_by`, the grouping field's values
/// become columns (series pivot), which is why that mode is limited to
/// a single aggregate. Records without a numeric time field are
/// skipped.
#[derive(Debug)]
pub struct TimechartProcessor {
    span: f64,
    time_field: String,
    group_by: Option<String>,
    specs: Vec<AggregateSpec>,

    buckets: BTreeMap<i64, Bucket>,
}

#[derive(Default)]
#[derive(Debug)]
struct Bucket {
    plain: Vec<Accumulator>,
    series: BTreeMap<String, Vec<Accumulator>>,
}

impl TimechartProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        let span = extract_param(&config.parameters, "span", 60.0f64);
        if span <= 0.0 {
            anyhow::bail!("'span' must be positive");
        }

        let group_by = extract_param(&config.parameters, "group_by", None::<String>);
        let specs = parse_aggregates(&config.parameters)?;
        if group_by.is_some() && specs.len() != 1 {
            anyhow::bail!("a 'group_by' timechart takes exactly one aggregate");
        }

        Ok(Self {
            span,
            time_field: extract_param(&config.parameters, "time_field", "_time".to_string()),
            group_by,
            specs,
            buckets: BTreeMap::new(),
        })
    }

    fn observe(&mut self, record: &Record) {
        let Some(time) = record.get_f64(&self.time_field) else { return };
        let index = (time / self.span).floor() as i64;

        let bucket = self.buckets.entry(index).or_default();
        match &self.group_by {
            None => {
                if bucket.plain.is_empty() {
                    bucket.plain = new_accumulators(&self.specs);
                }
                observe_all(&self.specs, &mut bucket.plain, record);
            }
            Some(field) => {
                let series = match record.get(field) {
                    Some(Value::String(s)) => s.clone(),
                    Some(value) if !value.is_null() => value.to_string(),
                    _ => "null".to_string(),
                };
                let accumulators = bucket
                    .series
                    .entry(series)
                    .or_insert_with(|| new_accumulators(&self.specs));
                observe_all(&self.specs, accumulators, record);
            }
        }
    }

    fn drain(&mut self) -> Result<RecordChunk> {
        let mut chunk = RecordChunk::new();
        for (index, bucket) in std::mem::take(&mut self.buckets) {
            let start = index as f64 * self.span;

            let mut record = Record::new();
            record.set(
                &self.time_field,
                Number::from_f64(start).map(Value::Number).unwrap_or(Value::Null),
            )?;

            match &self.group_by {
                None => {
                    for (spec, accumulator) in self.specs.iter().zip(&bucket.plain) {
                        record.set(&spec.output_name(), accumulator.finish())?;
                    }
                }
                Some(_) => {
                    for (series, accumulators) in &bucket.series {
                        record.set(series, accumulators[0].finish())?;
                    }
                }
            }

            chunk.push(record);
        }

        Ok(chunk)
    }
}

#[async_trait]
impl Processor for TimechartProcessor {
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
        self.buckets.clear();
    }
}
