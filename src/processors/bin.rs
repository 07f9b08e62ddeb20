use crate::config::{StageConfig, extract_param, require_param};
use crate::core::chunk::RecordChunk;
use crate::processors::processor::{Emitted, Processor};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Number, Value};

/// Buckets a numeric field.
///
/// With a `span`, bucketing is a pure record-local transform and the
/// stage streams. Without one, the stage divides the observed value
/// range into `bins` equal spans, which takes two passes: the first
/// learns the min/max, the second rewrites records. The factory flags
/// the stage accordingly.
pub struct BinProcessor {
    field: String,
    output: String,
    span: Option<f64>,
    bins: usize,

    // Bounds learned on the first pass of bins mode.
    low: Option<f64>,
    high: Option<f64>,
    scan_complete: bool,
    emitting: bool,
}

impl BinProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        let field: String = require_param(&config.parameters, "field")?;
        let span = extract_param(&config.parameters, "span", None::<f64>);
        if let Some(span) = span {
            if span <= 0.0 {
                anyhow::bail!("'span' must be positive");
            }
        }

        let bins = extract_param(&config.parameters, "bins", 10usize);
        if bins == 0 {
            anyhow::bail!("'bins' must be at least 1");
        }

        Ok(Self {
            output: extract_param(&config.parameters, "output", field.clone()),
            field,
            span,
            bins,
            low: None,
            high: None,
            scan_complete: false,
            emitting: false,
        })
    }

    /// True when the stage must see all input (and replay it) before it
    /// can bucket anything.
    pub fn needs_bounds(&self) -> bool {
        self.span.is_none()
    }

    fn bucket_start(&self, value: f64) -> f64 {
        if let Some(span) = self.span {
            return (value / span).floor() * span;
        }

        let (low, high) = (self.low.unwrap_or(0.0), self.high.unwrap_or(0.0));
        let width = match (high - low) / self.bins as f64 {
            w if w > 0.0 => w,
            _ => 1.0,
        };
        let index = (((value - low) / width).floor() as usize).min(self.bins - 1);
        low + index as f64 * width
    }

    fn rewrite(&self, chunk: &mut RecordChunk) -> Result<()> {
        for record in chunk.records_mut() {
            let Some(value) = record.get_f64(&self.field) else { continue };
            let start = self.bucket_start(value);
            record.set(
                &self.output,
                Number::from_f64(start).map(Value::Number).unwrap_or(Value::Null),
            )?;
        }
        Ok(())
    }
}

#[async_trait]
impl Processor for BinProcessor {
    async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted> {
        // Streaming span mode, and the second pass of bins mode.
        if self.span.is_some() || self.emitting {
            return match input {
                Some(mut chunk) => {
                    self.rewrite(&mut chunk)?;
                    Ok(Emitted::More(Some(chunk)))
                }
                None => Ok(Emitted::Done(None)),
            };
        }

        // First pass of bins mode: learn the bounds, emit nothing.
        match input {
            Some(chunk) => {
                for record in chunk.iter() {
                    if let Some(value) = record.get_f64(&self.field) {
                        self.low = Some(self.low.map_or(value, |low| low.min(value)));
                        self.high = Some(self.high.map_or(value, |high| high.max(value)));
                    }
                }
                Ok(Emitted::More(None))
            }
            None => {
                self.scan_complete = true;
                Ok(Emitted::More(None))
            }
        }
    }

    fn rewind(&mut self) {
        // Keep the learned bounds; after a completed scan, the next pass
        // is the emitting one.
        if self.scan_complete {
            self.emitting = true;
        }
    }
}
