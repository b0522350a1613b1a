//! Dynamic values bound as query parameters and read back from rows.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScanError;

/// Dynamic value type for query bindings and scanned columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

/// The kind of a [`Value`], used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    UInt,
    Float,
    String,
    Bytes,
    Uuid,
    Timestamp,
    List,
    Object,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::UInt => "uint",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Bytes => "bytes",
            ValueKind::Uuid => "uuid",
            ValueKind::Timestamp => "timestamp",
            ValueKind::List => "list",
            ValueKind::Object => "object",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::UInt(_) => ValueKind::UInt,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Uuid(_) => ValueKind::Uuid,
            Value::Timestamp(_) => ValueKind::Timestamp,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Canonical textual form of the value.
    ///
    /// Timestamps render as RFC3339 with microsecond precision. Null and
    /// binary values have no textual form.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null | Value::Bytes(_) => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(n) => Some(n.to_string()),
            Value::UInt(n) => Some(n.to_string()),
            Value::Float(n) => Some(n.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Uuid(u) => Some(u.to_string()),
            Value::Timestamp(t) => Some(t.to_rfc3339_opts(SecondsFormat::Micros, true)),
        }
    }

    /// Text form of a primary key, used to derive the UPDATE/DELETE target.
    ///
    /// Only numbers, strings and textual identifiers qualify; booleans,
    /// nulls and blobs do not identify a row.
    pub fn key_text(&self) -> Option<String> {
        match self {
            Value::Int(_)
            | Value::UInt(_)
            | Value::Float(_)
            | Value::String(_)
            | Value::Uuid(_)
            | Value::Timestamp(_) => self.to_text(),
            Value::Null | Value::Bool(_) | Value::Bytes(_) => None,
        }
    }

    /// Convert a JSON scalar. Arrays and objects are not values.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        match json {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => Some(if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::UInt(u)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }),
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::Number((*n).into()),
            Value::UInt(n) => serde_json::Value::Number((*n).into()),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Bytes(b) => {
                serde_json::Value::Array(b.iter().map(|x| serde_json::Value::from(*x)).collect())
            }
            other => other
                .to_text()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            other => match other.to_text() {
                Some(text) => write!(f, "{}", text),
                None => write!(f, "NULL"),
            },
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident $(as $cast:ty)?),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v $(as $cast)?)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int,
    u16 => UInt as u64,
    u32 => UInt as u64,
    u64 => UInt,
    f32 => Float as f64,
    f64 => Float,
    String => String,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    DateTime<Utc> => Timestamp,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Decode a [`Value`] into a Rust type.
///
/// Decoding is lenient where drivers disagree on representation: SQLite
/// hands back timestamps and UUIDs as text and booleans as integers.
pub trait FromValue: Sized {
    /// Name used in decode errors.
    const EXPECTED: &'static str;

    fn from_value(value: Value) -> Option<Self>;
}

/// Decode the value at `position`, reporting a [`ScanError`] on mismatch.
pub fn decode<T: FromValue>(position: usize, value: Value) -> Result<T, ScanError> {
    let found = value.kind();
    T::from_value(value).ok_or(ScanError::Decode {
        position,
        expected: T::EXPECTED,
        found,
    })
}

impl FromValue for i64 {
    const EXPECTED: &'static str = "i64";

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Int(n) => Some(n),
            Value::UInt(n) => i64::try_from(n).ok(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for i32 {
    const EXPECTED: &'static str = "i32";

    fn from_value(value: Value) -> Option<Self> {
        i64::from_value(value).and_then(|n| i32::try_from(n).ok())
    }
}

impl FromValue for u64 {
    const EXPECTED: &'static str = "u64";

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::UInt(n) => Some(n),
            Value::Int(n) => u64::try_from(n).ok(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    const EXPECTED: &'static str = "f64";

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(n) => Some(n),
            Value::Int(n) => Some(n as f64),
            Value::UInt(n) => Some(n as f64),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for bool {
    const EXPECTED: &'static str = "bool";

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(b),
            Value::Int(n) => Some(n != 0),
            Value::UInt(n) => Some(n != 0),
            _ => None,
        }
    }
}

impl FromValue for String {
    const EXPECTED: &'static str = "string";

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s),
            Value::Null | Value::Bytes(_) => None,
            other => other.to_text(),
        }
    }
}

impl FromValue for Vec<u8> {
    const EXPECTED: &'static str = "bytes";

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bytes(b) => Some(b),
            Value::String(s) => Some(s.into_bytes()),
            _ => None,
        }
    }
}

impl FromValue for Uuid {
    const EXPECTED: &'static str = "uuid";

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Uuid(u) => Some(u),
            Value::String(s) => Uuid::parse_str(&s).ok(),
            Value::Bytes(b) => Uuid::from_slice(&b).ok(),
            _ => None,
        }
    }
}

impl FromValue for DateTime<Utc> {
    const EXPECTED: &'static str = "timestamp";

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Timestamp(t) => Some(t),
            Value::String(s) => DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            _ => None,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_text_is_rfc3339() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            Value::Timestamp(t).to_text().as_deref(),
            Some("2024-03-01T12:30:00.000000Z")
        );
    }

    #[test]
    fn test_key_text_rejects_bool_and_null() {
        assert_eq!(Value::Int(42).key_text().as_deref(), Some("42"));
        assert_eq!(Value::UInt(7).key_text().as_deref(), Some("7"));
        assert_eq!(Value::Float(1.5).key_text().as_deref(), Some("1.5"));
        assert_eq!(Value::Bool(true).key_text(), None);
        assert_eq!(Value::Null.key_text(), None);
        assert_eq!(Value::Bytes(vec![1]).key_text(), None);
    }

    #[test]
    fn test_from_json_numbers() {
        assert_eq!(Value::from_json(&serde_json::json!(3)), Some(Value::Int(3)));
        assert_eq!(
            Value::from_json(&serde_json::json!(u64::MAX)),
            Some(Value::UInt(u64::MAX))
        );
        assert_eq!(Value::from_json(&serde_json::json!(0.5)), Some(Value::Float(0.5)));
        assert_eq!(Value::from_json(&serde_json::json!([1])), None);
    }

    #[test]
    fn test_decode_is_lenient_for_text_columns() {
        let id = Uuid::new_v4();
        let decoded: Uuid = decode(0, Value::String(id.to_string())).unwrap();
        assert_eq!(decoded, id);

        let flag: bool = decode(1, Value::Int(1)).unwrap();
        assert!(flag);

        let missing: Option<String> = decode(2, Value::Null).unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_decode_mismatch_reports_position() {
        let err = decode::<i64>(4, Value::Bool(true)).unwrap_err();
        assert_eq!(err.to_string(), "column 4: cannot decode bool as i64");
    }
}
