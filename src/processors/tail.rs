use crate::config::{StageConfig, extract_param};
use crate::core::chunk::RecordChunk;
use crate::core::record::Record;
use crate::processors::processor::{Emitted, Processor};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;

/// Keeps a sliding window of the last `limit` records, newest first.
///
/// As a bottleneck (the default) it emits the window once, on drain.
/// When the chain rewrite relaxes the flag it is switched into
/// streaming mode and re-emits the current window after every input
/// chunk; each snapshot replaces the previous one downstream, and
/// nothing further is owed at drain because the last snapshot already
/// covered every record seen. Memory stays bounded by the limit either
/// way.
pub struct TailProcessor {
    limit: usize,
    streaming: bool,
    window: VecDeque<Record>,
}

impl TailProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        let limit = extract_param(&config.parameters, "limit", 10usize);
        Ok(Self { limit, streaming: false, window: VecDeque::with_capacity(limit) })
    }

    fn snapshot(&self) -> RecordChunk {
        self.window.iter().rev().cloned().collect()
    }
}

#[async_trait]
impl Processor for TailProcessor {
    async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted> {
        match input {
            Some(chunk) => {
                let absorbed = !chunk.is_empty();
                for record in chunk {
                    if self.window.len() == self.limit {
                        self.window.pop_front();
                    }
                    if self.limit > 0 {
                        self.window.push_back(record);
                    }
                }

                if !self.streaming || !absorbed || self.window.is_empty() {
                    return Ok(Emitted::More(None));
                }
                Ok(Emitted::More(Some(self.snapshot())))
            }
            None => {
                let window = std::mem::take(&mut self.window);
                if self.streaming {
                    // Every window state already went out as a snapshot.
                    return Ok(Emitted::Done(None));
                }

                let records: RecordChunk = window.into_iter().rev().collect();
                Ok(Emitted::Done((!records.is_empty()).then_some(records)))
            }
        }
    }

    fn rewind(&mut self) {
        self.window.clear();
    }

    fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }
}
