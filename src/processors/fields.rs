use crate::config::{StageConfig, extract_param};
use crate::core::chunk::RecordChunk;
use crate::processors::processor::{Emitted, Processor};
use anyhow::{Result, bail};
use async_trait::async_trait;

enum Projection {
    Keep(Vec<String>),
    Remove(Vec<String>),
}

/// Projects top-level fields: either keep only the named fields or
/// remove them.
pub struct FieldsProcessor {
    projection: Projection,
}

impl FieldsProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        let keep = extract_param(&config.parameters, "keep", None::<Vec<String>>);
        let remove = extract_param(&config.parameters, "remove", None::<Vec<String>>);

        let projection = match (keep, remove) {
            (Some(keep), None) => Projection::Keep(keep),
            (None, Some(remove)) => Projection::Remove(remove),
            _ => bail!("'fields' requires exactly one of 'keep' or 'remove'"),
        };

        Ok(Self { projection })
    }
}

#[async_trait]
impl Processor for FieldsProcessor {
    async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted> {
        let Some(mut chunk) = input else {
            return Ok(Emitted::Done(None));
        };

        for record in chunk.records_mut() {
            match &self.projection {
                Projection::Keep(keep) => {
                    record.fields_mut().retain(|name, _| keep.iter().any(|k| k == name));
                }
                Projection::Remove(remove) => {
                    for name in remove {
                        record.remove(name);
                    }
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

    fn fields(params: serde_json::Value) -> Result<FieldsProcessor> {
        FieldsProcessor::from_config(&StageConfig {
            r#type: "fields".to_string(),
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
    async fn keep_projects_to_the_named_fields() {
        let mut stage = fields(json!({"keep": ["service", "level"]})).unwrap();

        let out = stage
            .process(Some(chunk(vec![
                json!({"service": "api", "level": "INFO", "latency_ms": 12}),
            ])))
            .await
            .unwrap()
            .into_output()
            .unwrap();

        let record = &out.records()[0];
        assert_eq!(record.fields().len(), 2);
        assert!(record.contains("service"));
        assert!(!record.contains("latency_ms"));
    }

    #[tokio::test]
    async fn remove_drops_the_named_fields() {
        let mut stage = fields(json!({"remove": ["message"]})).unwrap();

        let out = stage
            .process(Some(chunk(vec![json!({"service": "api", "message": "hi"})])))
            .await
            .unwrap()
            .into_output()
            .unwrap();

        assert!(!out.records()[0].contains("message"));
        assert!(out.records()[0].contains("service"));
    }

    #[test]
    fn requires_exactly_one_projection() {
        assert!(fields(json!({})).is_err());
        assert!(fields(json!({"keep": ["a"], "remove": ["b"]})).is_err());
    }
}
