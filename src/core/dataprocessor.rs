use crate::core::chunk::RecordChunk;
use crate::core::merge::merge_chunks;
use crate::core::record::RecordComparator;
use crate::core::stream::{CachedStream, Fetched, RecordStream};
use crate::processors::processor::{Emitted, Processor};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;

/// Statically declared behaviour of a stage, fixed at plan time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageFlags {
    /// The stage's output depends on the order of its input.
    pub input_order_matters: bool,
    /// The stage may emit records in a different order than it received
    /// them.
    pub permuting: bool,
    /// The stage must see all of its input before yielding any output.
    pub bottleneck: bool,
    /// The stage needs its input replayed once after the first full
    /// drain. Always a bottleneck.
    pub two_pass: bool,
}

/// One node of a pipeline: cached input streams, a processor, and the
/// pull loop gluing them together.
///
/// A node is itself a [`RecordStream`], so chains compose by fronting
/// the next node with a cached stream over this one.
pub struct DataProcessor {
    name: &'static str,
    streams: Vec<CachedStream>,
    less: Option<RecordComparator>,
    processor: Box<dyn Processor>,

    flags: StageFlags,
    finished_first_pass: bool,
}

impl std::fmt::Debug for DataProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataProcessor")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("finished_first_pass", &self.finished_first_pass)
            .finish_non_exhaustive()
    }
}

impl DataProcessor {
    pub fn new(name: &'static str, processor: Box<dyn Processor>, flags: StageFlags) -> Self {
        Self {
            name,
            streams: Vec::new(),
            less: None,
            processor,
            flags,
            finished_first_pass: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Front this node with a cached stream over `upstream`.
    pub fn attach_stream(&mut self, upstream: Box<dyn RecordStream>) {
        self.streams.push(CachedStream::new(upstream));
    }

    /// Install the record comparator used to merge multiple upstreams.
    pub fn set_comparator(&mut self, less: RecordComparator) {
        self.less = Some(less);
    }

    pub fn does_input_order_matter(&self) -> bool {
        self.flags.input_order_matters
    }

    pub fn is_permuting(&self) -> bool {
        self.flags.permuting
    }

    pub fn is_bottleneck(&self) -> bool {
        self.flags.bottleneck
    }

    pub fn is_two_pass(&self) -> bool {
        self.flags.two_pass
    }

    /// Finalize the bottleneck flag at plan time. Used by the chain
    /// rewrite for stages whose declared value depends on what runs
    /// before them. The processor is told whether its pre-drain output
    /// will be observed, so a relaxed stage can switch to interim
    /// emission.
    pub fn set_bottleneck(&mut self, bottleneck: bool) {
        self.flags.bottleneck = bottleneck;
        self.processor.set_streaming(!bottleneck);
    }

    /// Pull one chunk through this node.
    ///
    /// Loops until the processor produces something the caller should
    /// see: bottleneck output is withheld until end-of-input, a two-pass
    /// stage's first pass is drained and rewound entirely inside this
    /// call, and end-of-stream is multiplexed with the final output
    /// chunk. After an error the node is poisoned; callers must
    /// [`rewind`](Self::rewind) before fetching again.
    pub async fn fetch(&mut self) -> Result<Fetched> {
        loop {
            let (input, upstream_eof) = self
                .gather_input()
                .await
                .with_context(|| format!("stage '{}': failed to gather input", self.name))?
                .into_parts();

            let had_input = input.is_some();
            let mut eof = upstream_eof;
            let mut stage_done = false;

            let mut output = match self
                .processor
                .process(input)
                .await
                .with_context(|| format!("stage '{}': processing failed", self.name))?
            {
                Emitted::More(output) => output,
                Emitted::Done(output) => {
                    eof = true;
                    stage_done = true;
                    output
                }
            };

            // A Final chunk arrives multiplexed with end-of-stream, so
            // the processor is still owed its drain call.
            if upstream_eof && had_input && !stage_done {
                let drained = self
                    .processor
                    .process(None)
                    .await
                    .with_context(|| format!("stage '{}': drain failed", self.name))?
                    .into_output();
                output = concat_outputs(output, drained);
            }

            if eof {
                if self.flags.two_pass && !self.finished_first_pass {
                    self.finished_first_pass = true;
                    tracing::debug!(stage = self.name, "first pass complete, rewinding");
                    self.rewind()
                        .with_context(|| format!("stage '{}': rewind for second pass failed", self.name))?;
                    continue;
                }

                tracing::debug!(stage = self.name, "end of stream");
                return Ok(match output {
                    Some(chunk) => Fetched::Final(chunk),
                    None => Fetched::Eof,
                });
            }

            if let Some(chunk) = output {
                if !self.flags.bottleneck || (self.flags.two_pass && self.finished_first_pass) {
                    return Ok(Fetched::Chunk(chunk));
                }
                // A bottleneck owes nothing until end-of-input; anything
                // it hands back early is dropped.
            }
        }
    }

    /// Rewind every upstream stream and the processor for a fresh pass.
    ///
    /// The first-pass marker of a two-pass stage survives: pass two must
    /// remember what pass one learned.
    pub fn rewind(&mut self) -> Result<()> {
        for (index, stream) in self.streams.iter_mut().enumerate() {
            stream
                .rewind()
                .with_context(|| format!("stage '{}': rewind of stream {index} failed", self.name))?;
        }

        self.processor.rewind();
        Ok(())
    }

    async fn gather_input(&mut self) -> Result<Fetched> {
        match self.streams.len() {
            0 => bail!("no streams"),
            1 => self.streams[0].fetch().await,
            _ => self.merged_input().await,
        }
    }

    /// Pull one chunk from every live upstream and merge them under the
    /// installed comparator, handing unused suffixes straight back to
    /// their cached streams.
    async fn merged_input(&mut self) -> Result<Fetched> {
        let less = self.less.clone().context("missing comparator")?;

        let mut chunks = Vec::with_capacity(self.streams.len());
        let mut origins = Vec::with_capacity(self.streams.len());
        for (index, stream) in self.streams.iter_mut().enumerate() {
            if stream.is_exhausted() {
                continue;
            }

            match stream
                .fetch()
                .await
                .with_context(|| format!("failed to fetch from stream {index}"))?
            {
                Fetched::Chunk(chunk) | Fetched::Final(chunk) => {
                    chunks.push(chunk);
                    origins.push(index);
                }
                Fetched::Eof => {}
            }
        }

        if chunks.is_empty() {
            return Ok(Fetched::Eof);
        }

        let merged = merge_chunks(chunks, &less);
        for (slot, leftover) in merged.leftovers.into_iter().enumerate() {
            let remainder = (slot != merged.exhausted).then_some(leftover);
            self.streams[origins[slot]].set_remainder(remainder);
        }

        // End-of-stream propagates only once no stream can replenish.
        Ok(match self.streams.iter().all(CachedStream::is_exhausted) {
            true => Fetched::Final(merged.chunk),
            false => Fetched::Chunk(merged.chunk),
        })
    }
}

#[async_trait]
impl RecordStream for DataProcessor {
    async fn fetch(&mut self) -> Result<Fetched> {
        DataProcessor::fetch(self).await
    }

    fn rewind(&mut self) -> Result<()> {
        DataProcessor::rewind(self)
    }
}

fn concat_outputs(left: Option<RecordChunk>, right: Option<RecordChunk>) -> Option<RecordChunk> {
    match (left, right) {
        (Some(mut left), Some(right)) => {
            left.append(right);
            Some(left)
        }
        (Some(chunk), None) | (None, Some(chunk)) => Some(chunk),
        (None, None) => None,
    }
}
