use crate::config::{StageConfig, extract_param};
use crate::core::chunk::RecordChunk;
use crate::processors::processor::{Emitted, Processor};
use anyhow::Result;
use async_trait::async_trait;

/// Passes the first `limit` records and then declares the stage done,
/// which stops the driver from pulling upstream any further.
pub struct HeadProcessor {
    limit: u64,
    seen: u64,
}

impl HeadProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        let limit = extract_param(&config.parameters, "limit", 10u64);
        Ok(Self { limit, seen: 0 })
    }
}

#[async_trait]
impl Processor for HeadProcessor {
    async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted> {
        let Some(chunk) = input else {
            return Ok(Emitted::Done(None));
        };

        let remaining = self.limit - self.seen;
        if (chunk.len() as u64) < remaining {
            self.seen += chunk.len() as u64;
            return Ok(Emitted::More(Some(chunk)));
        }

        self.seen = self.limit;
        let (prefix, _) = chunk.split_prefix(remaining as usize);
        Ok(Emitted::Done((!prefix.is_empty()).then_some(prefix)))
    }

    fn rewind(&mut self) {
        self.seen = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Record;
    use serde_json::json;

    fn head(limit: u64) -> HeadProcessor {
        HeadProcessor {
            limit,
            seen: 0,
        }
    }

    fn chunk(values: &[i64]) -> RecordChunk {
        values
            .iter()
            .map(|v| serde_json::from_value::<Record>(json!({"x": v})).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn truncates_the_chunk_that_crosses_the_limit() {
        let mut stage = head(2);

        match stage.process(Some(chunk(&[10, 20, 30]))).await.unwrap() {
            Emitted::Done(Some(out)) => assert_eq!(out.len(), 2),
            other => panic!("expected done with records, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn passes_chunks_below_the_limit() {
        let mut stage = head(5);

        match stage.process(Some(chunk(&[1, 2]))).await.unwrap() {
            Emitted::More(Some(out)) => assert_eq!(out.len(), 2),
            other => panic!("expected more, got {other:?}"),
        }
        // Hitting the limit exactly finishes the stage.
        match stage.process(Some(chunk(&[3, 4, 5]))).await.unwrap() {
            Emitted::Done(Some(out)) => assert_eq!(out.len(), 3),
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn limit_zero_emits_nothing() {
        let mut stage = head(0);

        match stage.process(Some(chunk(&[1]))).await.unwrap() {
            Emitted::Done(None) => {}
            other => panic!("expected empty done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rewind_resets_the_count() {
        let mut stage = head(1);
        let _ = stage.process(Some(chunk(&[1]))).await.unwrap();
        stage.rewind();

        match stage.process(Some(chunk(&[2]))).await.unwrap() {
            Emitted::Done(Some(out)) => assert_eq!(out.len(), 1),
            other => panic!("expected done, got {other:?}"),
        }
    }
}
