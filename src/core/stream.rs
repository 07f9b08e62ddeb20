use crate::core::chunk::RecordChunk;
use anyhow::Result;
use async_trait::async_trait;

/// Result of one pull from a stream.
///
/// End-of-stream is a status, never an error, and it can arrive
/// multiplexed with the final records (`Final`) so the last partial
/// chunk of a pass is not lost.
#[derive(Debug)]
pub enum Fetched {
    /// A chunk of records; more may follow.
    Chunk(RecordChunk),
    /// The final records of this pass; the stream is now exhausted.
    Final(RecordChunk),
    /// Nothing left in this pass.
    Eof,
}

impl Fetched {
    /// Split into `(chunk, end_of_stream)`.
    pub fn into_parts(self) -> (Option<RecordChunk>, bool) {
        match self {
            Fetched::Chunk(chunk) => (Some(chunk), false),
            Fetched::Final(chunk) => (Some(chunk), true),
            Fetched::Eof => (None, true),
        }
    }
}

/// The pull contract shared by leaf producers and driver nodes, which is
/// what lets chains compose: any node is a stream to the node below it.
///
/// After `fetch` returns a non-end error the stream is poisoned; callers
/// must `rewind` before fetching again.
#[async_trait]
pub trait RecordStream: Send {
    async fn fetch(&mut self) -> Result<Fetched>;

    /// Restart the stream from the beginning of its input.
    fn rewind(&mut self) -> Result<()>;
}

/// A pull adapter that absorbs partial consumption.
///
/// The ordered merger routinely uses only a prefix of a fetched chunk;
/// the unused suffix comes back here as the *remainder* and is yielded
/// ahead of any fresh upstream pull. At most one remainder is held.
pub struct CachedStream {
    upstream: Box<dyn RecordStream>,
    remainder: Option<RecordChunk>,
    upstream_done: bool,
}

impl CachedStream {
    pub fn new(upstream: Box<dyn RecordStream>) -> Self {
        Self { upstream, remainder: None, upstream_done: false }
    }

    pub async fn fetch(&mut self) -> Result<Fetched> {
        if let Some(chunk) = self.remainder.take() {
            return Ok(match self.upstream_done {
                true => Fetched::Final(chunk),
                false => Fetched::Chunk(chunk),
            });
        }

        if self.upstream_done {
            return Ok(Fetched::Eof);
        }

        let fetched = self.upstream.fetch().await?;
        if matches!(fetched, Fetched::Final(_) | Fetched::Eof) {
            self.upstream_done = true;
        }
        Ok(fetched)
    }

    /// Store the unused suffix of the last fetch. An empty (or absent)
    /// chunk clears the remainder.
    pub fn set_remainder(&mut self, chunk: Option<RecordChunk>) {
        self.remainder = chunk.filter(|c| !c.is_empty());
    }

    /// True once upstream has signalled end and no remainder is held. A
    /// non-empty remainder set after end keeps the stream live until it
    /// is pulled.
    pub fn is_exhausted(&self) -> bool {
        self.upstream_done && self.remainder.is_none()
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.remainder = None;
        self.upstream_done = false;
        self.upstream.rewind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Record;
    use crate::processors::input::memory::ChunkSource;
    use serde_json::json;

    fn rec(value: serde_json::Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn chunk(values: &[i64]) -> RecordChunk {
        values.iter().map(|v| rec(json!({"n": v}))).collect()
    }

    fn cached(chunks: Vec<RecordChunk>) -> CachedStream {
        CachedStream::new(Box::new(ChunkSource::new(chunks)))
    }

    #[tokio::test]
    async fn yields_remainder_before_pulling_upstream() {
        let mut stream = cached(vec![chunk(&[1, 2])]);
        stream.set_remainder(Some(chunk(&[9])));

        match stream.fetch().await.unwrap() {
            Fetched::Chunk(c) => assert_eq!(c.records()[0].get("n"), Some(&json!(9))),
            other => panic!("expected chunk, got {other:?}"),
        }

        // Next pull reaches upstream; the source multiplexes its last
        // chunk with end-of-stream.
        match stream.fetch().await.unwrap() {
            Fetched::Final(c) => assert_eq!(c.len(), 2),
            other => panic!("expected final, got {other:?}"),
        }
        assert!(stream.is_exhausted());
    }

    #[tokio::test]
    async fn exhausted_stream_keeps_returning_eof() {
        let mut stream = cached(vec![]);

        assert!(matches!(stream.fetch().await.unwrap(), Fetched::Eof));
        assert!(stream.is_exhausted());
        assert!(matches!(stream.fetch().await.unwrap(), Fetched::Eof));
    }

    #[tokio::test]
    async fn remainder_after_end_keeps_stream_live() {
        let mut stream = cached(vec![chunk(&[1])]);

        assert!(matches!(stream.fetch().await.unwrap(), Fetched::Final(_)));
        assert!(stream.is_exhausted());

        stream.set_remainder(Some(chunk(&[1])));
        assert!(!stream.is_exhausted());

        // The held-back data comes out as the final chunk.
        match stream.fetch().await.unwrap() {
            Fetched::Final(c) => assert_eq!(c.len(), 1),
            other => panic!("expected final, got {other:?}"),
        }
        assert!(stream.is_exhausted());
    }

    #[tokio::test]
    async fn empty_remainder_clears() {
        let mut stream = cached(vec![chunk(&[1])]);
        stream.set_remainder(Some(RecordChunk::new()));
        assert!(matches!(stream.fetch().await.unwrap(), Fetched::Final(_)));
    }

    #[tokio::test]
    async fn rewind_drops_remainder_and_end_flag() {
        let mut stream = cached(vec![chunk(&[1, 2])]);

        assert!(matches!(stream.fetch().await.unwrap(), Fetched::Final(_)));
        stream.set_remainder(Some(chunk(&[2])));
        stream.rewind().unwrap();

        assert!(!stream.is_exhausted());
        match stream.fetch().await.unwrap() {
            Fetched::Final(c) => assert_eq!(c.len(), 2),
            other => panic!("expected full replay, got {other:?}"),
        }
    }
}
