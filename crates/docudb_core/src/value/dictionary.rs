//! Insertion-ordered string-keyed map.

use super::{Array, Timestamp, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A mapping from string keys to values.
///
/// Iteration follows insertion order; equality ignores it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dictionary {
    entries: IndexMap<String, Value>,
}

impl Dictionary {
    /// Creates an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Borrows the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Stores `value` under `key`, returning the previous value.
    ///
    /// Replacing an existing key keeps its position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    /// Removes `key`, preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Integer value of `key`, or 0.
    pub fn get_int(&self, key: &str) -> i32 {
        self.get(key).map_or(0, Value::as_int)
    }

    /// Long value of `key`, or 0.
    pub fn get_long(&self, key: &str) -> i64 {
        self.get(key).map_or(0, Value::as_long)
    }

    /// Float value of `key`, or 0.
    pub fn get_float(&self, key: &str) -> f32 {
        self.get(key).map_or(0.0, Value::as_float)
    }

    /// Double value of `key`, or 0.
    pub fn get_double(&self, key: &str) -> f64 {
        self.get(key).map_or(0.0, Value::as_double)
    }

    /// Boolean value of `key`, or false.
    pub fn get_boolean(&self, key: &str) -> bool {
        self.get(key).map_or(false, Value::as_bool)
    }

    /// String value of `key`.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Date value of `key`.
    pub fn get_date(&self, key: &str) -> Option<Timestamp> {
        self.get(key).and_then(Value::as_date)
    }

    /// Nested dictionary under `key`.
    pub fn get_dictionary(&self, key: &str) -> Option<&Dictionary> {
        self.get(key).and_then(Value::as_dictionary)
    }

    /// Nested array under `key`.
    pub fn get_array(&self, key: &str) -> Option<&Array> {
        self.get(key).and_then(Value::as_array)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Dictionary {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
