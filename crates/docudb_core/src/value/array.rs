//! Ordered value list.

use super::{Dictionary, Timestamp, Value};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// An ordered list of values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Array {
    items: Vec<Value>,
}

impl Array {
    /// Creates an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the array is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends a value.
    pub fn push(&mut self, value: impl Into<Value>) {
        self.items.push(value.into());
    }

    /// Borrows the value at `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    /// Replaces the value at `index`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `index` is out of bounds.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> CoreResult<Value> {
        let len = self.items.len();
        let slot = self.items.get_mut(index).ok_or_else(|| {
            CoreError::validation(format!("array index {index} out of bounds (len {len})"))
        })?;
        Ok(std::mem::replace(slot, value.into()))
    }

    /// Inserts a value at `index`, shifting later items.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `index` is past the end.
    pub fn insert(&mut self, index: usize, value: impl Into<Value>) -> CoreResult<()> {
        if index > self.items.len() {
            return Err(CoreError::validation(format!(
                "array index {index} out of bounds (len {})",
                self.items.len()
            )));
        }
        self.items.insert(index, value.into());
        Ok(())
    }

    /// Removes and returns the value at `index`.
    pub fn remove(&mut self, index: usize) -> Option<Value> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    /// Iterates the values in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    /// Integer at `index`, or 0.
    pub fn get_int(&self, index: usize) -> i32 {
        self.get(index).map_or(0, Value::as_int)
    }

    /// Long at `index`, or 0.
    pub fn get_long(&self, index: usize) -> i64 {
        self.get(index).map_or(0, Value::as_long)
    }

    /// Double at `index`, or 0.
    pub fn get_double(&self, index: usize) -> f64 {
        self.get(index).map_or(0.0, Value::as_double)
    }

    /// Boolean at `index`, or false.
    pub fn get_boolean(&self, index: usize) -> bool {
        self.get(index).map_or(false, Value::as_bool)
    }

    /// String at `index`.
    pub fn get_string(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(Value::as_str)
    }

    /// Date at `index`.
    pub fn get_date(&self, index: usize) -> Option<Timestamp> {
        self.get(index).and_then(Value::as_date)
    }

    /// Dictionary at `index`.
    pub fn get_dictionary(&self, index: usize) -> Option<&Dictionary> {
        self.get(index).and_then(Value::as_dictionary)
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Self { items }
    }
}

impl<V: Into<Value>> FromIterator<V> for Array {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl IntoIterator for Array {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Array {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
