pub mod common;
pub mod factory;
pub mod input;
pub mod output;
pub mod processor;

pub mod bin;
pub mod dedup;
pub mod eval;
pub mod fields;
pub mod fillnull;
pub mod gentimes;
pub mod head;
pub mod makemv;
pub mod regex;
pub mod rex;
pub mod search;
pub mod sort;
pub mod stats;
pub mod streamstats;
pub mod tail;
pub mod timechart;
pub mod top;
pub mod transaction;
pub mod where_;

pub use processor::{Emitted, Processor};
