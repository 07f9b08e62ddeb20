use crate::config::{StageConfig, extract_param, require_param};
use crate::core::chunk::RecordChunk;
use crate::core::record::Record;
use crate::processors::processor::{Emitted, Processor};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Keeps the first `limit` records per key combination. With
/// `consecutive`, only runs of equal keys are collapsed, so the seen-set
/// stays O(1). Records missing every key field are dropped.
pub struct DedupProcessor {
    fields: Vec<String>,
    limit: u64,
    consecutive: bool,

    seen: HashMap<String, u64>,
    current: Option<(String, u64)>,
}

impl DedupProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        let fields: Vec<String> = require_param(&config.parameters, "fields")?;
        if fields.is_empty() {
            anyhow::bail!("'fields' must name at least one field");
        }

        let limit = extract_param(&config.parameters, "limit", 1u64);
        if limit == 0 {
            anyhow::bail!("'limit' must be at least 1");
        }

        Ok(Self {
            fields,
            limit,
            consecutive: extract_param(&config.parameters, "consecutive", false),
            seen: HashMap::new(),
            current: None,
        })
    }

    fn key_of(&self, record: &Record) -> Option<String> {
        let values: Vec<&Value> = self
            .fields
            .iter()
            .filter_map(|field| record.get(field))
            .collect();
        if values.is_empty() {
            return None;
        }

        Some(
            self.fields
                .iter()
                .map(|field| record.get(field).unwrap_or(&Value::Null).to_string())
                .collect::<Vec<_>>()
                .join("\u{1f}"),
        )
    }

    fn admit(&mut self, key: String) -> bool {
        if self.consecutive {
            match &mut self.current {
                Some((current, count)) if *current == key => {
                    *count += 1;
                    *count <= self.limit
                }
                _ => {
                    self.current = Some((key, 1));
                    true
                }
            }
        } else {
            let count = self.seen.entry(key).or_insert(0);
            *count += 1;
            *count <= self.limit
        }
    }
}

#[async_trait]
impl Processor for DedupProcessor {
    async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted> {
        let Some(chunk) = input else {
            return Ok(Emitted::Done(None));
        };

        let mut kept = RecordChunk::new();
        for record in chunk {
            let Some(key) = self.key_of(&record) else { continue };
            if self.admit(key) {
                kept.push(record);
            }
        }

        Ok(Emitted::More((!kept.is_empty()).then_some(kept)))
    }

    fn rewind(&mut self) {
        self.seen.clear();
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dedup(params: serde_json::Value) -> DedupProcessor {
        DedupProcessor::from_config(&StageConfig {
            r#type: "dedup".to_string(),
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

    fn services(chunk: &RecordChunk) -> Vec<&str> {
        chunk.iter().map(|r| r.get("service").unwrap().as_str().unwrap()).collect()
    }

    #[tokio::test]
    async fn keeps_first_occurrence_per_key() {
        let mut stage = dedup(json!({"fields": ["service"]}));

        let out = stage
            .process(Some(chunk(vec![
                json!({"service": "api", "n": 1}),
                json!({"service": "db", "n": 2}),
                json!({"service": "api", "n": 3}),
            ])))
            .await
            .unwrap()
            .into_output()
            .unwrap();

        assert_eq!(services(&out), vec!["api", "db"]);
        assert_eq!(out.records()[0].get("n"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn state_spans_chunks() {
        let mut stage = dedup(json!({"fields": ["service"]}));

        let first = stage
            .process(Some(chunk(vec![json!({"service": "api"})])))
            .await
            .unwrap()
            .into_output();
        assert!(first.is_some());

        let second = stage
            .process(Some(chunk(vec![json!({"service": "api"})])))
            .await
            .unwrap()
            .into_output();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn limit_allows_extra_occurrences() {
        let mut stage = dedup(json!({"fields": ["service"], "limit": 2}));

        let out = stage
            .process(Some(chunk(vec![
                json!({"service": "api"}),
                json!({"service": "api"}),
                json!({"service": "api"}),
            ])))
            .await
            .unwrap()
            .into_output()
            .unwrap();

        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn consecutive_mode_collapses_runs_only() {
        let mut stage = dedup(json!({"fields": ["service"], "consecutive": true}));

        let out = stage
            .process(Some(chunk(vec![
                json!({"service": "api"}),
                json!({"service": "api"}),
                json!({"service": "db"}),
                json!({"service": "api"}),
            ])))
            .await
            .unwrap()
            .into_output()
            .unwrap();

        assert_eq!(services(&out), vec!["api", "db", "api"]);
    }

    #[tokio::test]
    async fn records_missing_every_key_field_are_dropped() {
        let mut stage = dedup(json!({"fields": ["service"]}));

        let out = stage
            .process(Some(chunk(vec![json!({"latency_ms": 9})])))
            .await
            .unwrap()
            .into_output();

        assert!(out.is_none());
    }
}
