use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::Arc;

/// A single log record: named fields with JSON values.
///
/// Field access uses dot notation for nested objects, so `device.id`
/// reaches into `{"device": {"id": ...}}`. Top-level helpers operate on
/// the outer object only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self { fields: Map::new() }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }

    /// Extract a field value using dot notation path.
    pub fn get(&self, field_path: &str) -> Option<&Value> {
        let mut parts = field_path.split('.');
        let mut current = self.fields.get(parts.next()?)?;

        for part in parts {
            current = current.get(part)?;
        }

        Some(current)
    }

    /// Set a field value using dot notation path, creating nested objects
    /// as needed. Fails when an intermediate path segment holds a
    /// non-object value.
    pub fn set(&mut self, field_path: &str, value: Value) -> anyhow::Result<()> {
        let parts: Vec<&str> = field_path.split('.').collect();

        if parts.is_empty() || parts[0].is_empty() {
            anyhow::bail!("empty field path");
        }

        if parts.len() == 1 {
            self.fields.insert(parts[0].to_string(), value);
            return Ok(());
        }

        let mut current = self
            .fields
            .entry(parts[0].to_string())
            .or_insert_with(|| Value::Object(Map::new()));

        for part in &parts[1..parts.len() - 1] {
            let obj = current
                .as_object_mut()
                .ok_or_else(|| anyhow::anyhow!("cannot navigate through non-object at '{part}'"))?;

            current = obj
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }

        let obj = current
            .as_object_mut()
            .ok_or_else(|| anyhow::anyhow!("cannot set field on non-object value"))?;
        obj.insert(parts[parts.len() - 1].to_string(), value);
        Ok(())
    }

    /// Remove a field using dot notation path. Missing paths are a no-op.
    pub fn remove(&mut self, field_path: &str) -> Option<Value> {
        let parts: Vec<&str> = field_path.split('.').collect();

        if parts.len() == 1 {
            return self.fields.remove(parts[0]);
        }

        let mut current = self.fields.get_mut(parts[0])?;
        for part in &parts[1..parts.len() - 1] {
            current = current.get_mut(*part)?;
        }

        current.as_object_mut()?.remove(parts[parts.len() - 1])
    }

    pub fn rename(&mut self, old_path: &str, new_path: &str) -> anyhow::Result<()> {
        if let Some(value) = self.remove(old_path) {
            self.set(new_path, value)?;
        }
        Ok(())
    }

    pub fn contains(&self, field_path: &str) -> bool {
        self.get(field_path).is_some()
    }

    /// Numeric view of a field, accepting numbers and numeric strings.
    pub fn get_f64(&self, field_path: &str) -> Option<f64> {
        match self.get(field_path)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// Rank used to order values of different JSON types.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < booleans < numbers < strings <
/// arrays < objects. Numbers compare numerically; two strings that both
/// parse as numbers also compare numerically, so `"9"` sorts before
/// `"10"` the way a latency column should.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => {
            match (x.trim().parse::<f64>(), y.trim().parse::<f64>()) {
                (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => x.cmp(y),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ if type_rank(a) != type_rank(b) => type_rank(a).cmp(&type_rank(b)),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// One key of a sort specification. Parsed from a field name with an
/// optional `-` prefix for descending order, e.g. `"-count"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(field) => Self { field: field.to_string(), descending: true },
            None => Self { field: spec.to_string(), descending: false },
        }
    }

    pub fn parse_all(specs: &[String]) -> Vec<Self> {
        specs.iter().map(|s| Self::parse(s)).collect()
    }
}

/// Compare two records under a list of sort keys. A missing field
/// compares as null.
pub fn compare_records(keys: &[SortKey], a: &Record, b: &Record) -> Ordering {
    for key in keys {
        let left = a.get(&key.field).unwrap_or(&Value::Null);
        let right = b.get(&key.field).unwrap_or(&Value::Null);

        let ordering = match key.descending {
            false => compare_values(left, right),
            true => compare_values(right, left),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// The `less(a, b)` predicate installed on driver nodes that merge more
/// than one upstream. Must be a strict weak order.
pub type RecordComparator = Arc<dyn Fn(&Record, &Record) -> bool + Send + Sync>;

/// Build the merge comparator for an `order_by` field list.
pub fn comparator_for(keys: Vec<SortKey>) -> RecordComparator {
    Arc::new(move |a, b| compare_records(&keys, a, b) == Ordering::Less)
}
