use crate::config::{StageConfig, extract_param, require_param};
use crate::core::chunk::RecordChunk;
use crate::core::record::{Record, SortKey, compare_records};
use crate::processors::processor::{Emitted, Processor};
use anyhow::Result;
use async_trait::async_trait;

/// Buffers the whole input and emits it sorted on drain. Keys are field
/// names with an optional `-` prefix for descending order; the sort is
/// stable, so equal records keep their arrival order.
pub struct SortProcessor {
    keys: Vec<SortKey>,
    limit: Option<usize>,
    buffer: Vec<Record>,
}

impl SortProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        let by: Vec<String> = require_param(&config.parameters, "by")?;
        if by.is_empty() {
            anyhow::bail!("'by' must name at least one sort key");
        }

        Ok(Self {
            keys: SortKey::parse_all(&by),
            limit: extract_param(&config.parameters, "limit", None::<usize>),
            buffer: Vec::new(),
        })
    }
}

#[async_trait]
impl Processor for SortProcessor {
    async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted> {
        match input {
            Some(chunk) => {
                self.buffer.extend(chunk);
                Ok(Emitted::More(None))
            }
            None => {
                let mut records = std::mem::take(&mut self.buffer);
                records.sort_by(|a, b| compare_records(&self.keys, a, b));
                if let Some(limit) = self.limit {
                    records.truncate(limit);
                }

                Ok(Emitted::Done((!records.is_empty()).then(|| records.into_iter().collect())))
            }
        }
    }

    fn rewind(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sort(params: serde_json::Value) -> SortProcessor {
        SortProcessor::from_config(&StageConfig {
            r#type: "sort".to_string(),
            parameters: serde_json::from_value(params).unwrap(),
        })
        .unwrap()
    }

    fn chunk(values: Vec<serde_json::Value>) -> RecordChunk {
        values
            .into_iter()
            .map(|v| serde_json::from_value::<Record>(v).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn buffers_until_drain_then_emits_sorted() {
        let mut stage = sort(json!({"by": ["v"]}));

        let out = stage
            .process(Some(chunk(vec![json!({"v": 3}), json!({"v": 1})])))
            .await
            .unwrap()
            .into_output();
        assert!(out.is_none());

        let _ = stage.process(Some(chunk(vec![json!({"v": 2})]))).await.unwrap();

        match stage.process(None).await.unwrap() {
            Emitted::Done(Some(out)) => {
                let values: Vec<i64> =
                    out.iter().map(|r| r.get("v").unwrap().as_i64().unwrap()).collect();
                assert_eq!(values, vec![1, 2, 3]);
            }
            other => panic!("expected sorted output, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn descending_keys_and_limit() {
        let mut stage = sort(json!({"by": ["-latency_ms"], "limit": 2}));

        let _ = stage
            .process(Some(chunk(vec![
                json!({"latency_ms": 10}),
                json!({"latency_ms": 900}),
                json!({"latency_ms": 250}),
            ])))
            .await
            .unwrap();

        match stage.process(None).await.unwrap() {
            Emitted::Done(Some(out)) => {
                let values: Vec<i64> = out
                    .iter()
                    .map(|r| r.get("latency_ms").unwrap().as_i64().unwrap())
                    .collect();
                assert_eq!(values, vec![900, 250]);
            }
            other => panic!("expected output, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_input_drains_to_nothing() {
        let mut stage = sort(json!({"by": ["v"]}));
        assert!(matches!(stage.process(None).await.unwrap(), Emitted::Done(None)));
    }
}
