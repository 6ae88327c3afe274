//! Document data and field-level operations.

use crate::path::{DocRef, FieldPath};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A document's field map.
pub type Fields = Map<String, Value>;

/// A document as read from the store at a point in time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub doc: DocRef,
    pub data: Fields,
}

impl DocumentSnapshot {
    pub fn new(doc: DocRef, data: Fields) -> Self {
        Self { doc, data }
    }

    pub fn id(&self) -> &str {
        self.doc.id()
    }

    /// Look up a (possibly nested) field.
    pub fn get(&self, field: &FieldPath) -> Option<&Value> {
        get_field(&self.data, field)
    }
}

/// Resolve a dotted field path inside a field map.
pub fn get_field<'a>(data: &'a Fields, field: &FieldPath) -> Option<&'a Value> {
    let mut segments = field.segments();
    let mut current = data.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Set a field, creating intermediate maps and replacing non-map
/// intermediates. Sibling fields are left untouched.
pub fn set_field(data: &mut Fields, field: &FieldPath, value: Value) {
    let segments: Vec<&str> = field.segments().collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = data;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry {
            Value::Object(map) => map,
            _ => unreachable!("entry was just replaced with an object"),
        };
    }
    current.insert(last.to_string(), value);
}

/// Add `delta` to an integer field, flooring the result at zero.
///
/// Integers are used as stored and floats are truncated toward zero. Missing
/// and non-numeric values count as zero. Returns the new value.
pub fn increment_field(data: &mut Fields, field: &FieldPath, delta: i64) -> i64 {
    let current = match get_field(data, field) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        _ => 0,
    };
    let next = current.saturating_add(delta).max(0);
    set_field(data, field, Value::from(next));
    next
}

/// JSON type name used in validation messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
