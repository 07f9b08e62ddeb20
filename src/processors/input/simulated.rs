use crate::config::{StageConfig, extract_param};
use crate::core::chunk::RecordChunk;
use crate::core::record::Record;
use crate::core::stream::{Fetched, RecordStream};
use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde_json::{Number, Value};

#[derive(Debug, Clone)]
pub struct SimulatedSourceConfig {
    pub count: u64,
    pub chunk_size: usize,
    pub seed: u64,
    pub start_time: f64,
    pub interval: f64,
    pub services: Vec<String>,
    pub mean_latency: f64,
    pub stddev_latency: f64,
}

impl SimulatedSourceConfig {
    fn from_stage_config(config: &StageConfig) -> Result<Self> {
        let config = Self {
            count: extract_param(&config.parameters, "count", 1000u64),
            chunk_size: extract_param(&config.parameters, "chunk_size", 256usize),
            seed: extract_param(&config.parameters, "seed", 1u64),
            start_time: extract_param(&config.parameters, "start_time", 1_700_000_000.0f64),
            interval: extract_param(&config.parameters, "interval", 1.0f64),
            services: extract_param(
                &config.parameters,
                "services",
                vec!["api".to_string(), "auth".to_string(), "db".to_string()],
            ),
            mean_latency: extract_param(&config.parameters, "mean_latency", 120.0f64),
            stddev_latency: extract_param(&config.parameters, "stddev_latency", 40.0f64),
        };

        if config.chunk_size == 0 {
            anyhow::bail!("'chunk_size' must be at least 1");
        }
        if config.services.is_empty() {
            anyhow::bail!("'services' must name at least one service");
        }
        if config.stddev_latency <= 0.0 {
            anyhow::bail!("'stddev_latency' must be positive");
        }

        Ok(config)
    }
}

/// Generates synthetic log records from a seeded RNG.
///
/// Useful for trying pipelines without data at hand, and deliberately
/// replayable: `rewind` restores the seed, so a two-pass stage sees the
/// identical sequence on both passes.
pub struct SimulatedSource {
    config: SimulatedSourceConfig,
    latency: Normal<f64>,
    rng: StdRng,
    emitted: u64,
}

impl SimulatedSource {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        Self::new(SimulatedSourceConfig::from_stage_config(config)?)
    }

    pub fn new(config: SimulatedSourceConfig) -> Result<Self> {
        let latency = Normal::new(config.mean_latency, config.stddev_latency)
            .map_err(|e| anyhow::anyhow!("invalid latency distribution: {e}"))?;

        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            latency,
            config,
            emitted: 0,
        })
    }

    fn generate(&mut self) -> Record {
        let time = self.config.start_time + self.emitted as f64 * self.config.interval;
        let pick = self.rng.random_range(0..self.config.services.len());
        let service = self.config.services[pick].clone();

        let roll: u32 = self.rng.random_range(0..100);
        let (level, message) = match roll {
            0..=79 => ("INFO", "request completed"),
            80..=94 => ("WARN", "slow response"),
            _ => ("ERROR", "upstream timeout"),
        };

        let latency_ms = self.latency.sample(&mut self.rng).max(1.0);
        let latency_ms = (latency_ms * 10.0).round() / 10.0;

        let mut record = Record::new();
        let _ = record.set("_time", Number::from_f64(time).map(Value::Number).unwrap_or(Value::Null));
        let _ = record.set("service", Value::String(service));
        let _ = record.set("level", Value::String(level.to_string()));
        let _ = record.set(
            "latency_ms",
            Number::from_f64(latency_ms).map(Value::Number).unwrap_or(Value::Null),
        );
        let _ = record.set("message", Value::String(message.to_string()));
        record
    }
}

#[async_trait]
impl RecordStream for SimulatedSource {
    async fn fetch(&mut self) -> Result<Fetched> {
        if self.emitted >= self.config.count {
            return Ok(Fetched::Eof);
        }

        let remaining = self.config.count - self.emitted;
        let take = remaining.min(self.config.chunk_size as u64);

        let mut chunk = RecordChunk::new();
        for _ in 0..take {
            chunk.push(self.generate());
            self.emitted += 1;
        }

        Ok(match self.emitted == self.config.count {
            true => Fetched::Final(chunk),
            false => Fetched::Chunk(chunk),
        })
    }

    fn rewind(&mut self) -> Result<()> {
        self.rng = StdRng::seed_from_u64(self.config.seed);
        self.emitted = 0;
        Ok(())
    }
}
