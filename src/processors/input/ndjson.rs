use crate::config::{StageConfig, extract_param, require_param};
use crate::core::chunk::RecordChunk;
use crate::core::record::Record;
use crate::core::stream::{Fetched, RecordStream};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Leaf producer reading newline-delimited JSON from a file.
///
/// The file is opened lazily on the first fetch, which keeps `rewind` a
/// synchronous state reset: the next fetch simply reopens from the
/// start. Blank lines are skipped; a malformed line is a stream error.
pub struct NdjsonSource {
    path: String,
    chunk_size: usize,

    reader: Option<BufReader<File>>,
    line_number: u64,
    done: bool,
}

impl NdjsonSource {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        let path: String = require_param(&config.parameters, "path")?;
        let chunk_size = extract_param(&config.parameters, "chunk_size", 1024usize);
        if chunk_size == 0 {
            anyhow::bail!("'chunk_size' must be at least 1");
        }

        Ok(Self::new(path, chunk_size))
    }

    pub fn new(path: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            path: path.into(),
            chunk_size,
            reader: None,
            line_number: 0,
            done: false,
        }
    }
}

#[async_trait]
impl RecordStream for NdjsonSource {
    async fn fetch(&mut self) -> Result<Fetched> {
        if self.done {
            return Ok(Fetched::Eof);
        }

        if self.reader.is_none() {
            let file = File::open(&self.path)
                .await
                .with_context(|| format!("failed to open '{}'", self.path))?;
            self.reader = Some(BufReader::new(file));
            self.line_number = 0;
        }

        let mut chunk = RecordChunk::new();
        let mut line = String::new();
        let mut at_end = false;

        {
            let reader = self.reader.as_mut().expect("reader just ensured");
            while chunk.len() < self.chunk_size {
                line.clear();
                let read = reader
                    .read_line(&mut line)
                    .await
                    .with_context(|| format!("failed to read '{}'", self.path))?;
                if read == 0 {
                    at_end = true;
                    break;
                }

                self.line_number += 1;
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let record: Record = serde_json::from_str(trimmed).with_context(|| {
                    format!("'{}' line {}: invalid record", self.path, self.line_number)
                })?;
                chunk.push(record);
            }
        }

        if at_end {
            self.done = true;
            self.reader = None;
        }

        Ok(match (self.done, chunk.is_empty()) {
            (true, true) => Fetched::Eof,
            (true, false) => Fetched::Final(chunk),
            (false, _) => Fetched::Chunk(chunk),
        })
    }

    fn rewind(&mut self) -> Result<()> {
        self.reader = None;
        self.line_number = 0;
        self.done = false;
        Ok(())
    }
}
