//! Term predicates for the `search` stage.

use crate::core::record::compare_values;
use serde_json::Value;
use std::cmp::Ordering;

/// Comparison operations a search term may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermOp {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    StartsWith,
    EndsWith,
}

impl TermOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" | "==" => Some(Self::Equals),
            "ne" | "!=" => Some(Self::NotEquals),
            "gt" | ">" => Some(Self::GreaterThan),
            "gte" | ">=" => Some(Self::GreaterThanOrEqual),
            "lt" | "<" => Some(Self::LessThan),
            "lte" | "<=" => Some(Self::LessThanOrEqual),
            "contains" => Some(Self::Contains),
            "startswith" => Some(Self::StartsWith),
            "endswith" => Some(Self::EndsWith),
            _ => None,
        }
    }

    /// Evaluate the operation against a field value. Ordered comparisons
    /// use the same total order as sort keys, so numeric strings compare
    /// numerically; the substring operations apply to strings only.
    pub fn evaluate(self, field_value: &Value, expected: &Value) -> bool {
        let ordering = || compare_values(field_value, expected);

        match self {
            Self::Equals => ordering() == Ordering::Equal,
            Self::NotEquals => ordering() != Ordering::Equal,
            Self::GreaterThan => ordering() == Ordering::Greater,
            Self::GreaterThanOrEqual => ordering() != Ordering::Less,
            Self::LessThan => ordering() == Ordering::Less,
            Self::LessThanOrEqual => ordering() != Ordering::Greater,
            Self::Contains => both_strings(field_value, expected, |f, e| f.contains(e)),
            Self::StartsWith => both_strings(field_value, expected, |f, e| f.starts_with(e)),
            Self::EndsWith => both_strings(field_value, expected, |f, e| f.ends_with(e)),
        }
    }
}

fn both_strings(field_value: &Value, expected: &Value, test: impl Fn(&str, &str) -> bool) -> bool {
    match (field_value, expected) {
        (Value::String(f), Value::String(e)) => test(f, e),
        _ => false,
    }
}
