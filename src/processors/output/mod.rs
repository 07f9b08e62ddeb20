//! Sinks for drained records.

pub mod ndjson;

pub use ndjson::NdjsonOutput;
