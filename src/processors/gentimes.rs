use crate::config::{StageConfig, extract_param, require_param};
use crate::core::chunk::RecordChunk;
use crate::core::record::Record;
use crate::processors::processor::{Emitted, Processor};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Generates `{starttime, endtime}` span records between two epoch
/// timestamps. A generator rather than a transform: it ignores its
/// (empty) input and produces the whole range when the driver drains
/// it.
pub struct GentimesProcessor {
    start: i64,
    end: i64,
    interval: i64,
    emitted: bool,
}

impl GentimesProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        let start: i64 = require_param(&config.parameters, "start")?;
        let end: i64 = require_param(&config.parameters, "end")?;
        if end <= start {
            anyhow::bail!("'end' must be after 'start'");
        }

        let interval = extract_param(&config.parameters, "interval", 86_400i64);
        if interval <= 0 {
            anyhow::bail!("'interval' must be positive");
        }

        Ok(Self { start, end, interval, emitted: false })
    }

    fn generate(&self) -> Result<RecordChunk> {
        let mut chunk = RecordChunk::new();
        let mut cursor = self.start;
        while cursor < self.end {
            let mut record = Record::new();
            record.set("starttime", Value::from(cursor))?;
            record.set("endtime", Value::from((cursor + self.interval).min(self.end)))?;
            chunk.push(record);
            cursor += self.interval;
        }
        Ok(chunk)
    }
}

#[async_trait]
impl Processor for GentimesProcessor {
    async fn process(&mut self, _input: Option<RecordChunk>) -> Result<Emitted> {
        if self.emitted {
            return Ok(Emitted::Done(None));
        }

        self.emitted = true;
        Ok(Emitted::Done(Some(self.generate()?)))
    }

    fn rewind(&mut self) {
        self.emitted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gentimes(params: serde_json::Value) -> Result<GentimesProcessor> {
        GentimesProcessor::from_config(&StageConfig {
            r#type: "gentimes".to_string(),
            parameters: serde_json::from_value(params).unwrap(),
        })
    }

    #[tokio::test]
    async fn generates_spans_with_a_clamped_final_bucket() {
        let mut stage = gentimes(json!({"start": 0, "end": 250, "interval": 100})).unwrap();

        match stage.process(None).await.unwrap() {
            Emitted::Done(Some(out)) => {
                assert_eq!(out.len(), 3);
                assert_eq!(out.records()[0].get("starttime"), Some(&json!(0)));
                assert_eq!(out.records()[0].get("endtime"), Some(&json!(100)));
                assert_eq!(out.records()[2].get("starttime"), Some(&json!(200)));
                assert_eq!(out.records()[2].get("endtime"), Some(&json!(250)));
            }
            other => panic!("expected spans, got {other:?}"),
        }
    }

    #[test]
    fn rejects_inverted_ranges() {
        assert!(gentimes(json!({"start": 10, "end": 5})).is_err());
    }
}
