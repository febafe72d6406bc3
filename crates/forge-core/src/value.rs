//! Dynamic SQL values.
//!
//! `Value` is the tagged variant every binding and every fetched column is
//! converted to. Models keep their attributes as `Value`s and the query builder
//! binds them positionally.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::fmt;

use crate::error::{Error, Result};

/// Storage format used when a date-time is written as text.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single SQL value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// SQL NULL.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Any integer, widened to 64 bits.
    Int(i64),
    /// Any floating-point number.
    Float(f64),
    /// Text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A date-time without time zone.
    DateTime(NaiveDateTime),
    /// Structured JSON.
    Json(serde_json::Value),
}

impl Value {
    /// Check whether this is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the variant, used in conversion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::DateTime(_) => "datetime",
            Value::Json(_) => "json",
        }
    }

    /// Borrow the text payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as an integer.
    ///
    /// Booleans map to 0/1, floats are truncated and numeric text is parsed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Float(f) => Some(*f as i64),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Json(serde_json::Value::Number(n)) => n.as_i64(),
            _ => None,
        }
    }

    /// Interpret the value as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Json(serde_json::Value::Number(n)) => n.as_f64(),
            _ => None,
        }
    }

    /// Interpret the value as a boolean.
    ///
    /// Integers are truthy when non-zero; text accepts `true/false/1/0/yes/no/on/off`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Float(f) => Some(*f != 0.0),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" | "" => Some(false),
                _ => None,
            },
            Value::Json(serde_json::Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Interpret the value as a date-time.
    ///
    /// Text is parsed as `YYYY-MM-DD HH:MM:SS`, RFC 3339, or a bare date
    /// (midnight). Integers are taken as Unix seconds.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            Value::Text(s) => parse_datetime(s),
            Value::Int(secs) => chrono::DateTime::from_timestamp(*secs, 0).map(|dt| dt.naive_utc()),
            _ => None,
        }
    }

    /// Interpret the value as JSON.
    ///
    /// Text is decoded; scalars are wrapped as JSON scalars.
    pub fn as_json(&self) -> Option<serde_json::Value> {
        match self {
            Value::Json(j) => Some(j.clone()),
            Value::Text(s) => serde_json::from_str(s).ok(),
            Value::Null => Some(serde_json::Value::Null),
            Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Value::Int(i) => Some(serde_json::Value::from(*i)),
            Value::Float(f) => serde_json::Number::from_f64(*f).map(serde_json::Value::Number),
            Value::DateTime(dt) => Some(serde_json::Value::String(
                dt.format(DATETIME_FORMAT).to_string(),
            )),
            Value::Bytes(_) => None,
        }
    }

    /// Render the value as a plain string.
    ///
    /// Used for cache keys and for relation key comparison, so integers and
    /// their textual form produce the same key.
    pub fn to_key_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => i64::from(*b).to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Bytes(b) => b.iter().map(|byte| format!("{byte:02x}")).collect(),
            Value::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
            Value::Json(j) => j.to_string(),
        }
    }

    /// Convert to a JSON value for serialization.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::Array(
                b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            ),
            Value::DateTime(dt) => {
                serde_json::Value::String(dt.format(DATETIME_FORMAT).to_string())
            }
            Value::Json(j) => j.clone(),
        }
    }

    /// Extract a typed value.
    #[allow(clippy::result_large_err)]
    pub fn get<T: FromValue>(&self) -> Result<T> {
        T::from_value(self)
    }
}

/// Parse the textual date-time formats drivers hand back.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.naive_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Text(s) => write!(f, "'{}'", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            other => f.write_str(&other.to_key_string()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Int(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
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
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Extraction of typed data from a `Value`.
pub trait FromValue: Sized {
    /// Convert, failing with `Error::Conversion` when the value does not fit.
    #[allow(clippy::result_large_err)]
    fn from_value(value: &Value) -> Result<Self>;
}

fn conversion_error(value: &Value, target: &str) -> Error {
    Error::Conversion(format!("cannot convert {} value to {}", value.type_name(), target))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| conversion_error(value, "i64"))
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = value.as_i64().ok_or_else(|| conversion_error(value, "i32"))?;
        i32::try_from(wide).map_err(|_| Error::Conversion(format!("{wide} does not fit in i32")))
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = value.as_i64().ok_or_else(|| conversion_error(value, "u64"))?;
        u64::try_from(wide).map_err(|_| Error::Conversion(format!("{wide} is negative")))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| conversion_error(value, "f64"))
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| conversion_error(value, "bool"))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null | Value::Bytes(_) => Err(conversion_error(value, "String")),
            Value::Text(s) => Ok(s.clone()),
            other => Ok(other.to_key_string()),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.as_bytes().to_vec()),
            other => Err(conversion_error(other, "bytes")),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_datetime()
            .ok_or_else(|| conversion_error(value, "NaiveDateTime"))
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_json().ok_or_else(|| conversion_error(value, "JSON"))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_conversions_widen() {
        assert_eq!(Value::from(7_i32), Value::Int(7));
        assert_eq!(Value::from(7_u8), Value::Int(7));
        assert_eq!(Value::from(Some(3_i64)), Value::Int(3));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_bool_from_text_and_int() {
        assert_eq!(Value::Int(1).as_bool(), Some(true));
        assert_eq!(Value::Text("off".into()).as_bool(), Some(false));
        assert_eq!(Value::Text("maybe".into()).as_bool(), None);
    }

    #[test]
    fn test_datetime_parsing() {
        let dt = Value::Text("2024-03-01 12:30:00".into()).as_datetime().unwrap();
        assert_eq!(dt.format(DATETIME_FORMAT).to_string(), "2024-03-01 12:30:00");

        let midnight = Value::Text("2024-03-01".into()).as_datetime().unwrap();
        assert_eq!(midnight.format(DATETIME_FORMAT).to_string(), "2024-03-01 00:00:00");

        let iso = Value::Text("2024-03-01T12:30:00Z".into()).as_datetime().unwrap();
        assert_eq!(iso, dt);
    }

    #[test]
    fn test_key_string_is_stable_across_int_and_text() {
        assert_eq!(Value::Int(42).to_key_string(), "42");
        assert_eq!(Value::Text("42".into()).to_key_string(), "42");
    }

    #[test]
    fn test_from_value_option() {
        let none: Option<i64> = Value::Null.get().unwrap();
        assert_eq!(none, None);
        let some: Option<i64> = Value::Int(5).get().unwrap();
        assert_eq!(some, Some(5));
        assert!(Value::Text("abc".into()).get::<i64>().is_err());
    }

    #[test]
    fn test_json_decoding_from_text() {
        let v = Value::Text(r#"{"a":[1,2]}"#.into());
        assert_eq!(v.as_json().unwrap()["a"][1], serde_json::json!(2));
    }

    #[test]
    fn test_serialize_value() {
        let json = serde_json::to_string(&Value::Text("x".into())).unwrap();
        assert_eq!(json, "\"x\"");
        let json = serde_json::to_string(&Value::Null).unwrap();
        assert_eq!(json, "null");
    }
}
