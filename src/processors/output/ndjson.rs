use crate::config::{StageConfig, extract_param};
use crate::core::chunk::RecordChunk;
use anyhow::{Context, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// Writes drained records as newline-delimited JSON to a file, or to
/// stdout when the path is `-`.
pub struct NdjsonOutput {
    writer: BufWriter<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl NdjsonOutput {
    /// Build the sink from an optional output configuration; the
    /// default is stdout.
    pub async fn from_config(config: &Option<StageConfig>) -> Result<Self> {
        let path = match config {
            Some(config) => extract_param(&config.parameters, "path", "-".to_string()),
            None => "-".to_string(),
        };
        Self::create(&path).await
    }

    pub async fn create(path: &str) -> Result<Self> {
        let target: Box<dyn AsyncWrite + Send + Unpin> = match path {
            "-" => Box::new(tokio::io::stdout()),
            path => Box::new(
                tokio::fs::File::create(path)
                    .await
                    .with_context(|| format!("failed to create output file '{path}'"))?,
            ),
        };

        Ok(Self { writer: BufWriter::new(target) })
    }

    pub async fn write_chunk(&mut self, chunk: &RecordChunk) -> Result<()> {
        for record in chunk.iter() {
            let line = serde_json::to_string(record).context("failed to serialise record")?;
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.write_all(b"\n").await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await.context("failed to flush output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Record;
    use serde_json::json;

    #[tokio::test]
    async fn writes_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ndjson");
        let path = path.to_str().unwrap();

        let chunk: RecordChunk = [
            serde_json::from_value::<Record>(json!({"service": "api"})).unwrap(),
            serde_json::from_value::<Record>(json!({"service": "db"})).unwrap(),
        ]
        .into_iter()
        .collect();

        let mut sink = NdjsonOutput::create(path).await.unwrap();
        sink.write_chunk(&chunk).await.unwrap();
        sink.flush().await.unwrap();

        let written = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(lines[1]).unwrap()["service"],
            "db"
        );
    }
}
