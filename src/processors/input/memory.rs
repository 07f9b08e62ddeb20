use crate::core::chunk::RecordChunk;
use crate::core::stream::{Fetched, RecordStream};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared view of a [`ChunkSource`]'s activity, usable after the source
/// has been handed to a pipeline.
#[derive(Clone, Debug, Default)]
pub struct SourceCounters {
    fetches: Arc<AtomicU64>,
    rewinds: Arc<AtomicU64>,
}

impl SourceCounters {
    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn rewinds(&self) -> u64 {
        self.rewinds.load(Ordering::Relaxed)
    }
}

/// A leaf producer over preloaded chunks.
///
/// Replayable, and it counts fetches and rewinds, which makes it the
/// workhorse source for tests and for embedding the engine over
/// in-memory data. The last chunk is multiplexed with end-of-stream
/// unless [`with_trailing_eof`](Self::with_trailing_eof) is set, in
/// which case end is reported on the pull after the last chunk.
pub struct ChunkSource {
    chunks: Vec<RecordChunk>,
    cursor: usize,
    trailing_eof: bool,
    counters: SourceCounters,
}

impl ChunkSource {
    pub fn new(chunks: Vec<RecordChunk>) -> Self {
        Self {
            chunks,
            cursor: 0,
            trailing_eof: false,
            counters: SourceCounters::default(),
        }
    }

    /// A source that is exhausted from the start. Generator stages run
    /// over this.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Report end-of-stream on its own pull instead of multiplexed with
    /// the last chunk.
    pub fn with_trailing_eof(mut self) -> Self {
        self.trailing_eof = true;
        self
    }

    pub fn counters(&self) -> SourceCounters {
        self.counters.clone()
    }
}

#[async_trait]
impl RecordStream for ChunkSource {
    async fn fetch(&mut self) -> Result<Fetched> {
        self.counters.fetches.fetch_add(1, Ordering::Relaxed);

        if self.cursor >= self.chunks.len() {
            return Ok(Fetched::Eof);
        }

        let chunk = self.chunks[self.cursor].clone();
        self.cursor += 1;

        Ok(match self.cursor == self.chunks.len() && !self.trailing_eof {
            true => Fetched::Final(chunk),
            false => Fetched::Chunk(chunk),
        })
    }

    fn rewind(&mut self) -> Result<()> {
        self.counters.rewinds.fetch_add(1, Ordering::Relaxed);
        self.cursor = 0;
        Ok(())
    }
}
