//! Aggregate specifications and accumulators shared by the `stats`,
//! `streamstats`, and `timechart` stages.

use crate::core::record::{Record, compare_values};
use anyhow::{Result, bail};
use serde::Deserialize;
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    DistinctCount,
}

impl AggregateFunction {
    pub fn name(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::DistinctCount => "distinct_count",
        }
    }
}

/// One requested aggregate: `{ function = "avg", field = "latency_ms",
/// as = "avg_latency" }`. `count` defaults to counting records
/// (`field = "*"`).
#[derive(Debug, Clone, Deserialize)]
pub struct AggregateSpec {
    pub function: AggregateFunction,
    #[serde(default = "default_field")]
    pub field: String,
    #[serde(rename = "as", default)]
    pub output: Option<String>,
}

fn default_field() -> String {
    "*".to_string()
}

impl AggregateSpec {
    /// The field name the result lands under.
    pub fn output_name(&self) -> String {
        if let Some(name) = &self.output {
            return name.clone();
        }

        match (self.function, self.field.as_str()) {
            (AggregateFunction::Count, "*") => "count".to_string(),
            _ => format!("{}_{}", self.function.name(), self.field),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.field == "*" && self.function != AggregateFunction::Count {
            bail!("aggregate '{}' requires a field", self.function.name());
        }
        Ok(())
    }
}

/// Parse and validate the `aggregates` parameter of a stage.
pub fn parse_aggregates(
    params: &Option<HashMap<String, serde_json::Value>>,
) -> Result<Vec<AggregateSpec>> {
    let specs: Vec<AggregateSpec> = crate::config::require_param(params, "aggregates")?;
    if specs.is_empty() {
        bail!("'aggregates' must name at least one aggregate");
    }

    for spec in &specs {
        spec.validate()?;
    }

    Ok(specs)
}

/// Running state of one aggregate over one group.
#[derive(Debug, Clone)]
pub struct Accumulator {
    function: AggregateFunction,
    count: u64,
    sum: f64,
    extreme: Option<Value>,
    distinct: HashSet<String>,
}

impl Accumulator {
    pub fn new(function: AggregateFunction) -> Self {
        Self {
            function,
            count: 0,
            sum: 0.0,
            extreme: None,
            distinct: HashSet::new(),
        }
    }

    pub fn observe(&mut self, record: &Record, field: &str) {
        match self.function {
            AggregateFunction::Count => {
                let counted = field == "*"
                    || record.get(field).map(|v| !v.is_null()).unwrap_or(false);
                if counted {
                    self.count += 1;
                }
            }
            AggregateFunction::Sum | AggregateFunction::Avg => {
                if let Some(value) = record.get_f64(field) {
                    self.sum += value;
                    self.count += 1;
                }
            }
            AggregateFunction::Min | AggregateFunction::Max => {
                let Some(value) = record.get(field) else { return };
                if value.is_null() {
                    return;
                }

                let wanted = match self.function {
                    AggregateFunction::Min => Ordering::Less,
                    _ => Ordering::Greater,
                };
                let replace = match &self.extreme {
                    Some(current) => compare_values(value, current) == wanted,
                    None => true,
                };
                if replace {
                    self.extreme = Some(value.clone());
                }
            }
            AggregateFunction::DistinctCount => {
                if let Some(value) = record.get(field) {
                    if !value.is_null() {
                        self.distinct.insert(value.to_string());
                    }
                }
            }
        }
    }

    pub fn finish(&self) -> Value {
        match self.function {
            AggregateFunction::Count => Value::from(self.count),
            AggregateFunction::Sum => number(self.sum),
            AggregateFunction::Avg => match self.count {
                0 => Value::Null,
                n => number(self.sum / n as f64),
            },
            AggregateFunction::Min | AggregateFunction::Max => {
                self.extreme.clone().unwrap_or(Value::Null)
            }
            AggregateFunction::DistinctCount => Value::from(self.distinct.len() as u64),
        }
    }
}

fn number(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

/// Fresh accumulators for a new group.
pub fn new_accumulators(specs: &[AggregateSpec]) -> Vec<Accumulator> {
    specs.iter().map(|spec| Accumulator::new(spec.function)).collect()
}

/// Feed one record to every accumulator of a group.
pub fn observe_all(specs: &[AggregateSpec], accumulators: &mut [Accumulator], record: &Record) {
    for (spec, accumulator) in specs.iter().zip(accumulators) {
        accumulator.observe(record, &spec.field);
    }
}
