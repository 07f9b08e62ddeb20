use crate::core::chunk::RecordChunk;
use anyhow::Result;
use async_trait::async_trait;

/// What a processor hands back from one `process` call.
#[derive(Debug)]
pub enum Emitted {
    /// Output so far (possibly none yet); the processor will take more
    /// input.
    More(Option<RecordChunk>),
    /// Output (possibly none) and the processor is finished for this
    /// pass; upstream must not be pulled again on its behalf.
    Done(Option<RecordChunk>),
}

impl Emitted {
    pub fn into_output(self) -> Option<RecordChunk> {
        match self {
            Emitted::More(output) | Emitted::Done(output) => output,
        }
    }
}

/// This trait defines the interface for the transform running inside a
/// pipeline stage. The driver node feeds it input chunks pulled from
/// upstream and forwards whatever it emits.
#[async_trait]
pub trait Processor: Send {
    /// Transform one input chunk.
    ///
    /// A `None` input is the drain signal: upstream is exhausted and the
    /// processor should emit anything it still owes (a bottleneck's
    /// buffered output, a transaction stage's open groups, ...).
    async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted>;

    /// Reset per-pass state for a re-read of the input. State learned
    /// across passes is deliberately retained; a two-pass stage keeps
    /// here whatever its first pass taught it.
    fn rewind(&mut self);

    /// Tell the stage whether output it emits before end-of-input will
    /// be observed by the caller. Set at plan time, when the chain
    /// rewrite finalizes the node's bottleneck flag; stages with a
    /// fixed emission strategy ignore it.
    fn set_streaming(&mut self, _streaming: bool) {}
}
