use crate::config::{StageConfig, extract_param, require_param};
use crate::core::chunk::RecordChunk;
use crate::core::record::Record;
use crate::processors::common::exprs::{eval_bool, prepare_expression};
use crate::processors::processor::{Emitted, Processor};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Number, Value};
use std::collections::HashMap;

/// Groups consecutive records that share key-field values into
/// transactions and emits one summary record per transaction: the key
/// fields, `eventcount`, `duration`, and the earliest timestamp.
///
/// `starts_when` gates the opening of a transaction (records arriving
/// for a closed key before it fires are discarded); `ends_when` closes
/// and emits it. Transactions still open at end-of-input are flushed on
/// drain.
pub struct TransactionProcessor {
    fields: Vec<String>,
    starts_when: Option<String>,
    ends_when: Option<String>,
    time_field: String,
    keep_events: bool,

    open: HashMap<String, Transaction>,
    order: Vec<String>,
}

struct Transaction {
    key_values: Vec<Value>,
    first_time: Option<f64>,
    last_time: Option<f64>,
    count: u64,
    events: Vec<Record>,
}

impl TransactionProcessor {
    pub fn from_config(config: &StageConfig) -> Result<Self> {
        let fields: Vec<String> = require_param(&config.parameters, "fields")?;
        if fields.is_empty() {
            anyhow::bail!("'fields' must name at least one field");
        }

        let starts_when = extract_param(&config.parameters, "starts_when", None::<String>)
            .map(|e| prepare_expression(&e));
        let ends_when = extract_param(&config.parameters, "ends_when", None::<String>)
            .map(|e| prepare_expression(&e));

        Ok(Self {
            fields,
            starts_when,
            ends_when,
            time_field: extract_param(&config.parameters, "time_field", "_time".to_string()),
            keep_events: extract_param(&config.parameters, "keep_events", false),
            open: HashMap::new(),
            order: Vec::new(),
        })
    }

    fn absorb(&mut self, record: Record, closed: &mut RecordChunk) -> Result<()> {
        if !self.fields.iter().any(|field| record.contains(field)) {
            return Ok(());
        }

        let key_values: Vec<Value> = self
            .fields
            .iter()
            .map(|field| record.get(field).cloned().unwrap_or(Value::Null))
            .collect();
        let key = key_values
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join("\u{1f}");

        if !self.open.contains_key(&key) {
            let opens = match &self.starts_when {
                Some(expression) => eval_bool(expression, &record).unwrap_or(false),
                None => true,
            };
            if !opens {
                return Ok(());
            }

            self.open.insert(
                key.clone(),
                Transaction {
                    key_values,
                    first_time: None,
                    last_time: None,
                    count: 0,
                    events: Vec::new(),
                },
            );
            self.order.push(key.clone());
        }

        let ends = match &self.ends_when {
            Some(expression) => eval_bool(expression, &record).unwrap_or(false),
            None => false,
        };

        let transaction = self.open.get_mut(&key).expect("just ensured");
        if let Some(time) = record.get_f64(&self.time_field) {
            transaction.first_time = Some(transaction.first_time.map_or(time, |t| t.min(time)));
            transaction.last_time = Some(transaction.last_time.map_or(time, |t| t.max(time)));
        }
        transaction.count += 1;
        if self.keep_events {
            transaction.events.push(record);
        }

        if ends {
            let transaction = self.open.remove(&key).expect("open transaction");
            self.order.retain(|k| k != &key);
            closed.push(self.summarize(transaction)?);
        }

        Ok(())
    }

    fn summarize(&self, transaction: Transaction) -> Result<Record> {
        let mut record = Record::new();
        for (field, value) in self.fields.iter().zip(transaction.key_values) {
            record.set(field, value)?;
        }

        if let Some(first) = transaction.first_time {
            record.set(
                &self.time_field,
                Number::from_f64(first).map(Value::Number).unwrap_or(Value::Null),
            )?;
        }

        let duration = match (transaction.first_time, transaction.last_time) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        };
        record.set(
            "duration",
            Number::from_f64(duration).map(Value::Number).unwrap_or(Value::Null),
        )?;
        record.set("eventcount", Value::from(transaction.count))?;

        if self.keep_events {
            let events: Vec<Value> = transaction
                .events
                .into_iter()
                .map(|event| Value::Object(event.fields().clone()))
                .collect();
            record.set("events", Value::Array(events))?;
        }

        Ok(record)
    }
}

#[async_trait]
impl Processor for TransactionProcessor {
    async fn process(&mut self, input: Option<RecordChunk>) -> Result<Emitted> {
        match input {
            Some(chunk) => {
                let mut closed = RecordChunk::new();
                for record in chunk {
                    self.absorb(record, &mut closed)?;
                }
                Ok(Emitted::More((!closed.is_empty()).then_some(closed)))
            }
            None => {
                // Flush transactions left open, in the order they opened.
                let mut flushed = RecordChunk::new();
                for key in std::mem::take(&mut self.order) {
                    let transaction = self.open.remove(&key).expect("open transaction");
                    flushed.push(self.summarize(transaction)?);
                }
                Ok(Emitted::Done((!flushed.is_empty()).then_some(flushed)))
            }
        }
    }

    fn rewind(&mut self) {
        self.open.clear();
        self.order.clear();
    }
}
