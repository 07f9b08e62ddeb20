use crate::config::{StageConfig, extract_param};
use crate::core::chunk::RecordChunk;
use crate::core::record::Record;
use crate::processors::processor::{Emitted, Processor};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;

/// Fills missing or null fields with a constant.
///
/// With an explicit field list the stage streams. Without one it fills
/// every field any record has, which requires the union of field names
/// and therefore two passes: the first collects names, the second
/// rewrites records. The factory flags the stage accordingly.
pub struct FillnullProcessor {
    value: Value,
    fields: Vec<String>,

    // Field-name union learned on the first pass of bare mode.
    seen_fields: BTreeSet<String>,
    scan_complete: bool,
    emitting: bool,
}

impl FillnullProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        Ok(Self {
            value: extract_param(&config.parameters, "value", Value::from(0)),
            fields: extract_param(&config.parameters, "fields", Vec::new()),
            seen_fields: BTreeSet::new(),
            scan_complete: false,
            emitting: false,
        })
    }

    /// True when the stage must scan all input for the field-name union
    /// before it can fill anything.
    pub fn needs_field_scan(&self) -> bool {
        self.fields.is_empty()
    }

    fn fill<'a>(&self, record: &mut Record, fields: impl Iterator<Item = &'a String>) -> Result<()> {
        for field in fields {
            let missing = match record.get(field) {
                None => true,
                Some(value) => value.is_null(),
            };
            if missing {
                record.set(field, self.value.clone())?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Processor for FillnullProcessor {
    async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted> {
        if !self.needs_field_scan() || self.emitting {
            return match input {
                Some(mut chunk) => {
                    for record in chunk.records_mut() {
                        match self.needs_field_scan() {
                            false => self.fill(record, self.fields.iter())?,
                            true => self.fill(record, self.seen_fields.iter())?,
                        }
                    }
                    Ok(Emitted::More(Some(chunk)))
                }
                None => Ok(Emitted::Done(None)),
            };
        }

        // First pass of bare mode: collect the union of field names.
        match input {
            Some(chunk) => {
                for record in chunk.iter() {
                    for name in record.fields().keys() {
                        self.seen_fields.insert(name.clone());
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
        // The field-name union survives; after a completed scan, the
        // next pass fills.
        if self.scan_complete {
            self.emitting = true;
        }
    }
}
