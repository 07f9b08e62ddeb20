use crate::config::{StageConfig, require_param};
use crate::core::chunk::RecordChunk;
use crate::processors::common::exprs::{eval_value, prepare_expression};
use crate::processors::processor::{Emitted, Processor};
use anyhow::Result;
use async_trait::async_trait;

/// Computes an expression over each record's fields and stores the
/// result under a new or existing field.
pub struct EvalProcessor {
    field: String,
    expression: String,
}

impl EvalProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        let field: String = require_param(&config.parameters, "field")?;
        let expression: String = require_param(&config.parameters, "expression")?;

        Ok(Self { field, expression: prepare_expression(&expression) })
    }
}

#[async_trait]
impl Processor for EvalProcessor {
    async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted> {
        let Some(mut chunk) = input else {
            return Ok(Emitted::Done(None));
        };

        for record in chunk.records_mut() {
            match eval_value(&self.expression, record) {
                Ok(value) => record.set(&self.field, value)?,
                Err(e) => {
                    // A record missing an operand keeps its shape.
                    tracing::debug!(field = %self.field, "eval skipped record: {e}");
                }
            }
        }

        Ok(Emitted::More(Some(chunk)))
    }

    fn rewind(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Record;
    use serde_json::json;

    fn config(params: serde_json::Value) -> StageConfig {
        StageConfig {
            r#type: "eval".to_string(),
            parameters: serde_json::from_value(params).unwrap(),
        }
    }

    fn chunk(values: Vec<serde_json::Value>) -> RecordChunk {
        values
            .into_iter()
            .map(|v| serde_json::from_value::<Record>(v).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn computes_and_stores_the_expression() {
        let mut eval = EvalProcessor::from_config(&config(
            json!({"field": "latency_s", "expression": "latency_ms / 1000"}),
        ))
        .unwrap();

        let out = eval
            .process(Some(chunk(vec![json!({"latency_ms": 1500})])))
            .await
            .unwrap()
            .into_output()
            .unwrap();

        assert_eq!(out.records()[0].get("latency_s"), Some(&json!(1.5)));
    }

    #[tokio::test]
    async fn failing_records_pass_through_unchanged() {
        let mut eval = EvalProcessor::from_config(&config(
            json!({"field": "y", "expression": "x * 2"}),
        ))
        .unwrap();

        let out = eval
            .process(Some(chunk(vec![json!({"x": 4}), json!({"service": "api"})])))
            .await
            .unwrap()
            .into_output()
            .unwrap();

        assert_eq!(out.records()[0].get("y"), Some(&json!(8.0)));
        assert_eq!(out.records()[1].get("y"), None);
    }

    #[tokio::test]
    async fn missing_parameters_fail_construction() {
        assert!(EvalProcessor::from_config(&config(json!({"field": "y"}))).is_err());
    }
}
