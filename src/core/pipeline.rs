use crate::config::Config;
use crate::core::dataprocessor::DataProcessor;
use crate::core::record::{SortKey, comparator_for};
use crate::core::stream::{Fetched, RecordStream};
use crate::processors::factory;
use crate::processors::input::{self, ChunkSource};
use crate::processors::output::NdjsonOutput;

use anyhow::{Context, Result, bail};
use tracing::Instrument;
use uuid::Uuid;

/// Builds a runnable [`Pipeline`] from a validated [`Config`].
pub struct PipelineManager {
    config: Config,
}

impl PipelineManager {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Construct the stage chain: create every driver node, finalize
    /// chain-dependent flags, then wire stage *i+1* over stage *i* and
    /// the first stage over the configured inputs.
    pub fn build(self) -> Result<Pipeline> {
        let Config { inputs, pipeline, output } = self.config;

        if pipeline.stages.is_empty() {
            bail!("pipeline has no stages");
        }

        let mut nodes = Vec::with_capacity(pipeline.stages.len());
        for (index, stage) in pipeline.stages.iter().enumerate() {
            let node = factory::create_node(stage)
                .with_context(|| format!("stage {index} ('{}')", stage.r#type))?;
            nodes.push(node);
        }
        finalize_chain_flags(&mut nodes);

        let mut sources: Vec<Box<dyn RecordStream>> = Vec::new();
        if nodes[0].name() == "gentimes" {
            // Generators run over an already-exhausted input.
            sources.push(Box::new(ChunkSource::empty()));
        } else {
            // Stream indices (and merge tie-breaking) follow input name
            // order, so multi-input pipelines behave deterministically.
            let mut names: Vec<&String> = inputs.keys().collect();
            names.sort();
            for name in names {
                sources.push(input::create_source(name, &inputs[name])?);
            }
        }
        if sources.is_empty() {
            bail!("pipeline has no inputs");
        }

        let stage_count = nodes.len();
        let multi_input = sources.len() > 1;
        let mut nodes = nodes.into_iter();
        let mut first = nodes.next().expect("at least one stage");
        for source in sources {
            first.attach_stream(source);
        }
        if multi_input {
            if pipeline.order_by.is_empty() {
                bail!("multiple inputs require an 'order_by' merge ordering");
            }
            first.set_comparator(comparator_for(SortKey::parse_all(&pipeline.order_by)));
        }

        let mut chain = first;
        for mut node in nodes {
            node.attach_stream(Box::new(chain));
            chain = node;
        }

        tracing::info!(stages = stage_count, "pipeline built");
        Ok(Pipeline { description: pipeline.description, node: chain, output })
    }
}

/// Finalize flags that depend on the whole chain rather than one
/// stage's options: `tail` only needs to be a bottleneck when an
/// earlier stage may reorder records without itself buffering to
/// end-of-input; otherwise its sliding window can ride the stream.
fn finalize_chain_flags(nodes: &mut [DataProcessor]) {
    let mut upstream_reorders = false;
    for node in nodes.iter_mut() {
        if node.name() == "tail" {
            node.set_bottleneck(upstream_reorders);
        }
        if node.is_permuting() && !node.is_bottleneck() {
            upstream_reorders = true;
        }
    }
}

/// A wired stage chain ready to pull from.
pub struct Pipeline {
    description: String,
    node: DataProcessor,
    output: Option<crate::config::StageConfig>,
}

/// What a finished run did.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunStats {
    pub records: u64,
    pub fetches: u64,
}

impl Pipeline {
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The last driver node of the chain (the one the caller pulls).
    pub fn node(&self) -> &DataProcessor {
        &self.node
    }

    /// Pull one chunk through the whole chain.
    pub async fn fetch(&mut self) -> Result<Fetched> {
        self.node.fetch().await
    }

    /// Reset the chain for a fresh pass over the inputs.
    pub fn rewind(&mut self) -> Result<()> {
        self.node.rewind()
    }

    /// Drain the chain into the configured sink.
    pub async fn run(mut self) -> Result<RunStats> {
        let query_id = Uuid::new_v4();
        let span = tracing::info_span!("pipeline", query = %query_id);

        async move {
            tracing::info!(description = %self.description, "starting pipeline");

            let mut sink = NdjsonOutput::from_config(&self.output).await?;
            let stats = self.drain_into(&mut sink).await?;
            sink.flush().await?;

            tracing::info!(records = stats.records, fetches = stats.fetches, "pipeline complete");
            Ok(stats)
        }
        .instrument(span)
        .await
    }

    /// Drain the chain into an arbitrary sink.
    pub async fn drain_into(&mut self, sink: &mut NdjsonOutput) -> Result<RunStats> {
        let mut stats = RunStats::default();

        loop {
            let (chunk, eof) = self.node.fetch().await?.into_parts();
            stats.fetches += 1;

            if let Some(chunk) = chunk {
                stats.records += chunk.len() as u64;
                sink.write_chunk(&chunk).await?;
            }
            if eof {
                return Ok(stats);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_string;
    use crate::core::chunk::RecordChunk;
    use crate::core::dataprocessor::StageFlags;
    use crate::core::record::Record;
    use crate::processors::processor::{Emitted, Processor};
    use async_trait::async_trait;
    use serde_json::json;
    use std::io::Write;

    fn pipeline(toml: &str) -> Pipeline {
        let config = load_config_from_string(toml).unwrap();
        crate::config::validate_config(&config).unwrap();
        PipelineManager::new(config).build().unwrap()
    }

    async fn drain(pipeline: &mut Pipeline) -> Vec<Record> {
        let mut records = Vec::new();
        loop {
            let (chunk, eof) = pipeline.fetch().await.unwrap().into_parts();
            if let Some(chunk) = chunk {
                records.extend(chunk);
            }
            if eof {
                return records;
            }
        }
    }

    struct Passthrough;

    #[async_trait]
    impl Processor for Passthrough {
        async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted> {
            Ok(Emitted::More(input))
        }

        fn rewind(&mut self) {}
    }

    fn n_chunk(values: &[i64]) -> crate::core::chunk::RecordChunk {
        values
            .iter()
            .map(|v| serde_json::from_value::<Record>(json!({"n": v})).unwrap())
            .collect()
    }

    fn n_values(chunk: &crate::core::chunk::RecordChunk) -> Vec<i64> {
        chunk.iter().map(|r| r.get("n").unwrap().as_i64().unwrap()).collect()
    }

    fn tail_node() -> DataProcessor {
        crate::processors::factory::create_node(&crate::config::StageConfig {
            r#type: "tail".to_string(),
            parameters: None,
        })
        .unwrap()
    }

    #[test]
    fn tail_after_buffering_permuters_is_not_flagged_bottleneck() {
        let sort = crate::processors::factory::create_node(&crate::config::StageConfig {
            r#type: "sort".to_string(),
            parameters: serde_json::from_value(json!({"by": ["v"]})).unwrap(),
        })
        .unwrap();

        let mut nodes = vec![sort, tail_node()];
        finalize_chain_flags(&mut nodes);

        // sort is permuting but buffers everything, so tail can stream.
        assert!(!nodes[1].is_bottleneck());
    }

    #[test]
    fn tail_after_a_streaming_permuter_stays_a_bottleneck() {
        let shuffle = DataProcessor::new(
            "shuffle",
            Box::new(Passthrough),
            StageFlags { permuting: true, ..StageFlags::default() },
        );

        let mut nodes = vec![shuffle, tail_node()];
        finalize_chain_flags(&mut nodes);

        assert!(nodes[1].is_bottleneck());
    }

    #[tokio::test]
    async fn relaxed_tail_streams_interim_windows() {
        let noop = DataProcessor::new("noop", Box::new(Passthrough), StageFlags::default());

        let mut nodes = vec![noop, tail_node()];
        finalize_chain_flags(&mut nodes);
        assert!(!nodes[1].is_bottleneck());

        let mut nodes = nodes.into_iter();
        let mut first = nodes.next().unwrap();
        first.attach_stream(Box::new(ChunkSource::new(vec![
            n_chunk(&[1, 2]),
            n_chunk(&[3]),
        ])));
        let mut tail = nodes.next().unwrap();
        tail.attach_stream(Box::new(first));

        // A window snapshot comes out before end-of-input...
        match tail.fetch().await.unwrap() {
            Fetched::Chunk(chunk) => assert_eq!(n_values(&chunk), vec![2, 1]),
            other => panic!("expected an interim window, got {other:?}"),
        }
        // ...and the final fetch carries the authoritative window, with
        // no duplicate drain emission appended.
        match tail.fetch().await.unwrap() {
            Fetched::Final(chunk) => assert_eq!(n_values(&chunk), vec![3, 2, 1]),
            other => panic!("expected the final window, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn builds_and_runs_a_config_defined_chain() {
        let mut pipeline = pipeline(
            r#"
            [inputs.events]
            type = "simulated"
            parameters = { count = 50, chunk_size = 16, seed = 3 }

            [pipeline]
            description = "routine traffic only"

            [[pipeline.stages]]
            type = "where"
            parameters = { expression = "level == \"INFO\"" }

            [[pipeline.stages]]
            type = "fields"
            parameters = { keep = ["level", "service"] }
            "#,
        );

        let records = drain(&mut pipeline).await;
        assert!(!records.is_empty());
        assert!(records.len() < 50);
        for record in &records {
            assert_eq!(record.get("level"), Some(&json!("INFO")));
            assert!(!record.contains("latency_ms"));
        }
    }

    #[tokio::test]
    async fn merges_multiple_inputs_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, keys: &[i64]| {
            let path = dir.path().join(name);
            let mut file = std::fs::File::create(&path).unwrap();
            for key in keys {
                writeln!(file, "{}", json!({"k": key})).unwrap();
            }
            path
        };
        let a = write("a.ndjson", &[1, 3, 5]);
        let b = write("b.ndjson", &[2, 4]);

        let mut pipeline = pipeline(&format!(
            r#"
            [inputs.a]
            type = "ndjson"
            parameters = {{ path = "{}" }}

            [inputs.b]
            type = "ndjson"
            parameters = {{ path = "{}" }}

            [pipeline]
            order_by = ["k"]
            stages = [{{ type = "fields", parameters = {{ keep = ["k"] }} }}]
            "#,
            a.display(),
            b.display(),
        ));

        let records = drain(&mut pipeline).await;
        let keys: Vec<i64> = records.iter().map(|r| r.get("k").unwrap().as_i64().unwrap()).collect();
        assert_eq!(keys, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn gentimes_pipelines_generate_their_own_input() {
        let mut pipeline = pipeline(
            r#"
            [pipeline]
            stages = [
                { type = "gentimes", parameters = { start = 0, end = 500, interval = 100 } },
                { type = "head", parameters = { limit = 2 } },
            ]
            "#,
        );

        let records = drain(&mut pipeline).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("starttime"), Some(&json!(0)));
        assert_eq!(records[1].get("starttime"), Some(&json!(100)));
    }

    #[tokio::test]
    async fn two_pass_stages_replay_the_configured_input() {
        let mut pipeline = pipeline(
            r#"
            [inputs.events]
            type = "simulated"
            parameters = { count = 40, chunk_size = 8, seed = 11 }

            [pipeline]
            stages = [{ type = "bin", parameters = { field = "latency_ms", bins = 4, output = "bucket" } }]
            "#,
        );

        let records = drain(&mut pipeline).await;
        assert_eq!(records.len(), 40);
        assert!(records.iter().all(|r| r.contains("bucket")));

        let buckets: std::collections::HashSet<String> = records
            .iter()
            .map(|r| r.get("bucket").unwrap().to_string())
            .collect();
        assert!(buckets.len() <= 4);
    }

    #[tokio::test]
    async fn run_writes_ndjson_to_the_configured_sink() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.ndjson");

        let pipeline = pipeline(&format!(
            r#"
            [inputs.events]
            type = "simulated"
            parameters = {{ count = 12, chunk_size = 5, seed = 2 }}

            [pipeline]
            stages = [{{ type = "head", parameters = {{ limit = 3 }} }}]

            [output]
            type = "ndjson"
            parameters = {{ path = "{}" }}
            "#,
            out.display(),
        ));

        let stats = pipeline.run().await.unwrap();
        assert_eq!(stats.records, 3);

        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written.lines().count(), 3);
    }
}
