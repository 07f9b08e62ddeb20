//! Expression evaluation over records.
//!
//! Bridges record fields into an `evalexpr` context so stage options
//! like `latency_ms > 250 && service == "api"` can run against each
//! record. Nested objects are flattened to dotted names, arrays to
//! indexed names.

use crate::core::record::Record;
use anyhow::{Result, anyhow};
use evalexpr::{ContextWithMutableVariables, HashMapContext, Value as EvalValue};
use serde_json::{Number, Value};

/// Rewrite common math functions to their namespaced `evalexpr` forms,
/// so users can write `sqrt(latency_ms)` instead of
/// `math::sqrt(latency_ms)`. Done once at stage construction.
pub fn prepare_expression(expression: &str) -> String {
    let math_functions = [
        ("sqrt", "math::sqrt"),
        ("sin", "math::sin"),
        ("cos", "math::cos"),
        ("tan", "math::tan"),
        ("log", "math::log10"),
        ("ln", "math::ln"),
        ("abs", "math::abs"),
        ("floor", "math::floor"),
        ("ceil", "math::ceil"),
        ("exp", "math::exp"),
    ];

    let mut processed = expression.to_string();
    for (func, namespaced) in &math_functions {
        let pattern = format!(r"\b{}\b", regex::escape(func));
        if let Ok(re) = regex::Regex::new(&pattern) {
            processed = re.replace_all(&processed, *namespaced).to_string();
        }
    }

    processed
}

/// Build an evaluation context holding every field of the record.
pub fn record_context(record: &Record) -> HashMapContext {
    let mut context = HashMapContext::new();
    for (key, value) in record.fields() {
        add_value(&mut context, key, value);
    }
    context
}

fn add_value(context: &mut HashMapContext, prefix: &str, value: &Value) {
    match value {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                let _ = context.set_value(prefix.to_string(), EvalValue::Float(f));
            }
        }
        Value::Bool(b) => {
            let _ = context.set_value(prefix.to_string(), EvalValue::Boolean(*b));
        }
        Value::String(s) => {
            let _ = context.set_value(prefix.to_string(), EvalValue::String(s.clone()));
        }
        Value::Object(map) => {
            for (key, nested) in map {
                add_value(context, &format!("{prefix}.{key}"), nested);
            }
        }
        Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                add_value(context, &format!("{prefix}[{index}]"), nested);
            }
        }
        Value::Null => {}
    }
}

/// Evaluate a boolean expression against a record.
pub fn eval_bool(expression: &str, record: &Record) -> Result<bool> {
    evalexpr::eval_boolean_with_context(expression, &record_context(record))
        .map_err(|e| anyhow!("expression evaluation failed: {e}"))
}

/// Evaluate an expression against a record, converting the result back
/// to a JSON value.
pub fn eval_value(expression: &str, record: &Record) -> Result<Value> {
    let result = evalexpr::eval_with_context(expression, &record_context(record))
        .map_err(|e| anyhow!("expression evaluation failed: {e}"))?;
    Ok(to_json(result))
}

fn to_json(value: EvalValue) -> Value {
    match value {
        EvalValue::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        EvalValue::Int(i) => Value::from(i),
        EvalValue::Boolean(b) => Value::Bool(b),
        EvalValue::String(s) => Value::String(s),
        EvalValue::Tuple(items) => Value::Array(items.into_iter().map(to_json).collect()),
        EvalValue::Empty => Value::Null,
    }
}
