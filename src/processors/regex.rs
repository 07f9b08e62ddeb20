use crate::config::{StageConfig, extract_param, require_param};
use crate::core::chunk::RecordChunk;
use crate::processors::processor::{Emitted, Processor};
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

/// Filters records by matching a field against a regular expression.
/// With `negate`, keeps the records that do not match; a missing or
/// non-string field counts as a non-match.
pub struct RegexProcessor {
    field: String,
    pattern: Regex,
    negate: bool,
}

impl RegexProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        let field = extract_param(&config.parameters, "field", "_raw".to_string());
        let pattern: String = require_param(&config.parameters, "pattern")?;
        let negate = extract_param(&config.parameters, "negate", false);

        let pattern = Regex::new(&pattern)
            .with_context(|| format!("invalid regex pattern '{pattern}'"))?;

        Ok(Self { field, pattern, negate })
    }
}

#[async_trait]
impl Processor for RegexProcessor {
    async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted> {
        let Some(chunk) = input else {
            return Ok(Emitted::Done(None));
        };

        let kept: RecordChunk = chunk
            .into_iter()
            .filter(|record| {
                let matched = match record.get(&self.field) {
                    Some(Value::String(s)) => self.pattern.is_match(s),
                    _ => false,
                };
                matched != self.negate
            })
            .collect();

        Ok(Emitted::More((!kept.is_empty()).then_some(kept)))
    }

    fn rewind(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Record;
    use serde_json::json;

    fn stage(params: serde_json::Value) -> Result<RegexProcessor> {
        RegexProcessor::from_config(&StageConfig {
            r#type: "regex".to_string(),
            parameters: serde_json::from_value(params).unwrap(),
        })
    }

    fn chunk(values: Vec<serde_json::Value>) -> RecordChunk {
        values
            .into_iter()
            .map(|v| serde_json::from_value::<Record>(v).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn keeps_matching_records() {
        let mut stage =
            stage(json!({"field": "message", "pattern": "timeout|refused"})).unwrap();

        let out = stage
            .process(Some(chunk(vec![
                json!({"message": "connection refused"}),
                json!({"message": "ok"}),
                json!({"latency_ms": 5}),
            ])))
            .await
            .unwrap()
            .into_output()
            .unwrap();

        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn negate_inverts_the_filter() {
        let mut stage =
            stage(json!({"field": "message", "pattern": "ok", "negate": true})).unwrap();

        let out = stage
            .process(Some(chunk(vec![
                json!({"message": "ok"}),
                json!({"message": "boom"}),
            ])))
            .await
            .unwrap()
            .into_output()
            .unwrap();

        assert_eq!(out.records()[0].get("message"), Some(&json!("boom")));
    }

    #[test]
    fn invalid_patterns_fail_construction() {
        assert!(stage(json!({"pattern": "("})).is_err());
    }
}
