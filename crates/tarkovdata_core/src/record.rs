//! JSON objects edited in place.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::diff::values_equal;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// String field, or `""` when absent or not a string.
    pub fn str(&self, key: &str) -> &str {
        self.0.get(key).and_then(Value::as_str).unwrap_or("")
    }

    pub fn i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    pub fn object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.0.get(key).and_then(Value::as_object)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> bool {
        set_field(&mut self.0, key, value.into())
    }

    /// Nested object under `key`, appended empty when absent.
    pub fn object_mut(&mut self, key: &str) -> Result<&mut Map<String, Value>> {
        object_entry(&mut self.0, key)
    }

    /// Takes the value under `key`, leaving `null` in its place.
    pub fn take(&mut self, key: &str) -> Option<Value> {
        self.0.get_mut(key).map(Value::take)
    }

    /// Removes `key` without moving the keys after it.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

impl TryFrom<Value> for Record {
    type Error = anyhow::Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => bail!("expected a JSON object, found {}", kind_name(&other)),
        }
    }
}

/// Sets `key` unless it already holds an equal value (numbers compare by value). An existing
/// key keeps its position.
pub fn set_field(map: &mut Map<String, Value>, key: &str, value: Value) -> bool {
    if map
        .get(key)
        .is_some_and(|current| values_equal(current, &value))
    {
        return false;
    }
    map.insert(key.to_string(), value);
    true
}

pub fn object_entry<'m>(
    map: &'m mut Map<String, Value>,
    key: &str,
) -> Result<&'m mut Map<String, Value>> {
    match map
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()))
    {
        Value::Object(inner) => Ok(inner),
        other => bail!("`{key}` is {} rather than an object", kind_name(other)),
    }
}

/// Renames `old` to `new` at the same position. When `new` already exists it wins and `old`
/// is dropped. Returns whether anything changed.
pub fn rename_key(map: &mut Map<String, Value>, old: &str, new: &str) -> bool {
    if !map.contains_key(old) {
        return false;
    }
    if map.contains_key(new) {
        map.shift_remove(old);
        return true;
    }
    let entries = std::mem::take(map);
    for (key, value) in entries {
        if key == old {
            map.insert(new.to_string(), value);
        } else {
            map.insert(key, value);
        }
    }
    true
}

/// Whole floats become integers, so `45.0` is written as `45`.
pub fn number_value(value: f64) -> Value {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
        Value::Number(Number::from(value as i64))
    } else {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
