use crate::config::{StageConfig, require_param};
use crate::core::chunk::RecordChunk;
use crate::processors::common::conditions::TermOp;
use crate::processors::processor::{Emitted, Processor};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
struct RawTerm {
    field: String,
    op: String,
    value: Value,
}

/// Keeps records satisfying every configured term. A term on a missing
/// field fails.
#[derive(Debug)]
pub struct SearchProcessor {
    terms: Vec<(String, TermOp, Value)>,
}

impl SearchProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        let raw: Vec<RawTerm> = require_param(&config.parameters, "terms")?;
        if raw.is_empty() {
            anyhow::bail!("'terms' must name at least one term");
        }

        let terms = raw
            .into_iter()
            .map(|term| {
                let op = TermOp::parse(&term.op)
                    .ok_or_else(|| anyhow!("unknown search operation '{}'", term.op))?;
                Ok((term.field, op, term.value))
            })
            .collect::<Result<_>>()?;

        Ok(Self { terms })
    }

    fn matches(&self, record: &crate::core::record::Record) -> bool {
        self.terms.iter().all(|(field, op, expected)| {
            record
                .get(field)
                .map(|value| op.evaluate(value, expected))
                .unwrap_or(false)
        })
    }
}

#[async_trait]
impl Processor for SearchProcessor {
    async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted> {
        let Some(chunk) = input else {
            return Ok(Emitted::Done(None));
        };

        let kept: RecordChunk = chunk.into_iter().filter(|r| self.matches(r)).collect();
        Ok(Emitted::More((!kept.is_empty()).then_some(kept)))
    }

    fn rewind(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Record;
    use serde_json::json;

    fn search(terms: serde_json::Value) -> Result<SearchProcessor> {
        SearchProcessor::from_config(&StageConfig {
            r#type: "search".to_string(),
            parameters: serde_json::from_value(json!({"terms": terms})).unwrap(),
        })
    }

    fn chunk(values: Vec<serde_json::Value>) -> RecordChunk {
        values
            .into_iter()
            .map(|v| serde_json::from_value::<Record>(v).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn all_terms_must_hold() {
        let mut stage = search(json!([
            {"field": "level", "op": "eq", "value": "ERROR"},
            {"field": "latency_ms", "op": "gte", "value": 100},
        ]))
        .unwrap();

        let out = stage
            .process(Some(chunk(vec![
                json!({"level": "ERROR", "latency_ms": 150}),
                json!({"level": "ERROR", "latency_ms": 50}),
                json!({"level": "INFO", "latency_ms": 900}),
                json!({"latency_ms": 900}),
            ])))
            .await
            .unwrap()
            .into_output()
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out.records()[0].get("latency_ms"), Some(&json!(150)));
    }

    #[test]
    fn unknown_operations_fail_construction() {
        let err = search(json!([{"field": "a", "op": "between", "value": 1}])).unwrap_err();
        assert!(err.to_string().contains("unknown search operation"));
    }
}
