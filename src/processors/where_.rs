use crate::config::{StageConfig, require_param};
use crate::core::chunk::RecordChunk;
use crate::processors::common::exprs::{eval_bool, prepare_expression};
use crate::processors::processor::{Emitted, Processor};
use anyhow::Result;
use async_trait::async_trait;

/// Keeps records for which a boolean expression holds. Records whose
/// evaluation fails (missing operands, type errors) are dropped.
pub struct WhereProcessor {
    expression: String,
}

impl WhereProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        let expression: String = require_param(&config.parameters, "expression")?;
        Ok(Self { expression: prepare_expression(&expression) })
    }
}

#[async_trait]
impl Processor for WhereProcessor {
    async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted> {
        let Some(chunk) = input else {
            return Ok(Emitted::Done(None));
        };

        let kept: RecordChunk = chunk
            .into_iter()
            .filter(|record| eval_bool(&self.expression, record).unwrap_or(false))
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

    fn where_stage(expression: &str) -> WhereProcessor {
        WhereProcessor::from_config(&StageConfig {
            r#type: "where".to_string(),
            parameters: serde_json::from_value(json!({"expression": expression})).unwrap(),
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
    async fn keeps_only_matching_records() {
        let mut stage = where_stage("latency_ms > 250");

        let out = stage
            .process(Some(chunk(vec![
                json!({"latency_ms": 100}),
                json!({"latency_ms": 300}),
            ])))
            .await
            .unwrap()
            .into_output()
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out.records()[0].get("latency_ms"), Some(&json!(300)));
    }

    #[tokio::test]
    async fn unevaluable_records_are_dropped() {
        let mut stage = where_stage("latency_ms > 250");

        let out = stage
            .process(Some(chunk(vec![json!({"service": "api"})])))
            .await
            .unwrap()
            .into_output();

        assert!(out.is_none());
    }
}
