//! Typed document values.
//!
//! A document body is a [`Dictionary`] whose values are [`Value`]s. Nested
//! dictionaries and arrays are plain values: reading one returns a copy,
//! and changes reach the document only when written back with `set`.
//!
//! Numeric accessors coerce the way callers expect from a loosely typed
//! store: integers widen losslessly, floats truncate toward zero, booleans
//! read as 0/1, and anything non-numeric reads as zero.

mod array;
mod dictionary;

pub use array::Array;
pub use dictionary::Dictionary;

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A point in time with millisecond precision (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Returns the current time.
    pub fn now() -> Self {
        let millis = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
            Err(before) => -i64::try_from(before.duration().as_millis()).unwrap_or(i64::MAX),
        };
        Self(millis)
    }

    /// Creates a timestamp from milliseconds since the Unix epoch.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Milliseconds since the Unix epoch.
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Converts to a [`SystemTime`].
    pub fn to_system_time(self) -> SystemTime {
        let magnitude = Duration::from_millis(self.0.unsigned_abs());
        if self.0 >= 0 {
            UNIX_EPOCH + magnitude
        } else {
            UNIX_EPOCH - magnitude
        }
    }
}

impl fmt::Display for Timestamp {
    /// Formats as ISO-8601, e.g. `2024-03-01T12:30:05.250Z`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.0.rem_euclid(1000);
        let secs = self.0.div_euclid(1000);
        let days = secs.div_euclid(86_400);
        let rem = secs.rem_euclid(86_400);

        // Civil date from days since epoch (proleptic Gregorian).
        let z = days + 719_468;
        let era = z.div_euclid(146_097);
        let doe = z.rem_euclid(146_097);
        let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = doy - (153 * mp + 2) / 5 + 1;
        let month = if mp < 10 { mp + 3 } else { mp - 9 };
        let year = yoe + era * 400 + i64::from(month <= 2);

        write!(
            f,
            "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
            rem / 3600,
            (rem % 3600) / 60,
            rem % 60
        )
    }
}

/// A single value stored in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    /// Explicit null.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// Double-precision float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Date.
    Date(Timestamp),
    /// Nested dictionary.
    Dictionary(Dictionary),
    /// Nested array.
    Array(Array),
}

impl Value {
    /// Name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Dictionary(_) => "dictionary",
            Value::Array(_) => "array",
        }
    }

    /// Reads the value as a 64-bit integer.
    pub fn as_long(&self) -> i64 {
        match self {
            Value::Integer(i) => *i,
            // `as` saturates and maps NaN to 0.
            Value::Float(f) => *f as i64,
            Value::Bool(b) => i64::from(*b),
            _ => 0,
        }
    }

    /// Reads the value as a 32-bit integer, truncating wider integers.
    pub fn as_int(&self) -> i32 {
        match self {
            Value::Float(f) => *f as i32,
            other => other.as_long() as i32,
        }
    }

    /// Reads the value as a double.
    pub fn as_double(&self) -> f64 {
        match self {
            Value::Integer(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Bool(b) => f64::from(u8::from(*b)),
            _ => 0.0,
        }
    }

    /// Reads the value as a single-precision float.
    pub fn as_float(&self) -> f32 {
        self.as_double() as f32
    }

    /// Reads the value as a boolean.
    ///
    /// Numbers are true when nonzero, null is false, and any other
    /// present value is true.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            _ => true,
        }
    }

    /// Returns the string, if the value is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the date, if the value is one.
    pub fn as_date(&self) -> Option<Timestamp> {
        match self {
            Value::Date(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Returns the nested dictionary, if the value is one.
    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the nested array, if the value is one.
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Returns true for integers and floats.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Checks that the value can be stored and replicated.
    ///
    /// Non-finite floats have no portable encoding and are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] naming the offending path.
    pub fn validate(&self, path: &str) -> CoreResult<()> {
        match self {
            Value::Float(f) if !f.is_finite() => Err(CoreError::validation(format!(
                "value at {path} is not a finite number"
            ))),
            Value::Dictionary(dict) => {
                for (key, value) in dict.iter() {
                    value.validate(&format!("{path}.{key}"))?;
                }
                Ok(())
            }
            Value::Array(array) => {
                for (index, value) in array.iter().enumerate() {
                    value.validate(&format!("{path}[{index}]"))?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Date(v)
    }
}

impl From<Dictionary> for Value {
    fn from(v: Dictionary) -> Self {
        Value::Dictionary(v)
    }
}

impl From<Array> for Value {
    fn from(v: Array) -> Self {
        Value::Array(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(Array::from(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_coercions() {
        let v = Value::from(7);
        assert_eq!(v.as_int(), 7);
        assert_eq!(v.as_long(), 7);
        assert_eq!(v.as_float(), 7.0);
        assert_eq!(v.as_double(), 7.0);
        assert!(v.as_bool());
        assert!(!Value::from(0).as_bool());
        assert_eq!(v.as_str(), None);
    }

    #[test]
    fn float_truncates_toward_zero() {
        assert_eq!(Value::from(2.9).as_int(), 2);
        assert_eq!(Value::from(-2.9).as_long(), -2);
        assert_eq!(Value::Float(f64::NAN).as_long(), 0);
        assert!(Value::from(0.5).as_bool());
    }

    #[test]
    fn non_numeric_reads_as_zero() {
        let s = Value::from("12");
        assert_eq!(s.as_int(), 0);
        assert_eq!(s.as_double(), 0.0);
        assert!(s.as_bool());
        assert!(!Value::Null.as_bool());
        assert_eq!(Value::Bool(true).as_long(), 1);
    }

    #[test]
    fn typed_accessors_reject_other_types() {
        let date = Value::from(Timestamp::from_millis(1_000));
        assert_eq!(date.as_date(), Some(Timestamp::from_millis(1_000)));
        assert_eq!(date.as_str(), None);
        assert!(Value::from(1).as_date().is_none());
        assert!(Value::from("x").as_dictionary().is_none());
    }

    #[test]
    fn validate_rejects_non_finite() {
        let mut nested = Dictionary::new();
        nested.set("bad", f64::INFINITY);
        let err = Value::from(nested).validate("body").unwrap_err();
        assert!(err.to_string().contains("body.bad"));
        assert!(Value::from(1.5).validate("x").is_ok());
    }

    #[test]
    fn timestamp_formats_as_iso8601() {
        assert_eq!(
            Timestamp::from_millis(0).to_string(),
            "1970-01-01T00:00:00.000Z"
        );
        assert_eq!(
            Timestamp::from_millis(1_709_296_205_250).to_string(),
            "2024-03-01T12:30:05.250Z"
        );
        assert_eq!(
            Timestamp::from_millis(-1).to_string(),
            "1969-12-31T23:59:59.999Z"
        );
    }

    #[test]
    fn timestamp_now_is_after_2020() {
        assert!(Timestamp::now().as_millis() > 1_577_836_800_000);
        let ts = Timestamp::from_millis(5_000);
        assert_eq!(
            ts.to_system_time().duration_since(UNIX_EPOCH).unwrap(),
            Duration::from_secs(5)
        );
    }
}
