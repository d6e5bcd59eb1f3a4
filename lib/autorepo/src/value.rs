use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single result row, as handed back by the persistence engine.
///
/// Entities travel as JSON documents keyed by their camelCase properties;
/// scalar results (counts, flags) are bare JSON values.
pub type Row = serde_json::Value;

/// A value that can be bound to a query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Strings(Vec<String>),
    Datetime(DateTime<Utc>),
    /// A whole entity (or list of entities) for save/delete operations.
    Document(serde_json::Value),
    Null,
}

impl Value {
    /// Serialize an entity into a bindable document.
    pub fn document<T: Serialize>(item: &T) -> Result<Self, serde_json::Error> {
        Ok(Value::Document(serde_json::to_value(item)?))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null | Value::Document(serde_json::Value::Null))
    }

    /// JSON form of the value, as engines that speak JSON expect it.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::from(s.as_str()),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::UInt(n) => serde_json::Value::from(*n),
            Value::Float(n) => serde_json::Value::from(*n),
            Value::Bool(b) => serde_json::Value::from(*b),
            Value::Strings(v) => serde_json::Value::from(v.clone()),
            Value::Datetime(dt) => serde_json::Value::from(dt.to_rfc3339()),
            Value::Document(doc) => doc.clone(),
            Value::Null => serde_json::Value::Null,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(s.clone())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::UInt(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// usize and isize are at most 64 bits on every supported target.
impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::UInt(n as u64)
    }
}

impl From<isize> for Value {
    fn from(n: isize) -> Self {
        Value::Int(n as i64)
    }
}

macro_rules! impl_from_narrow {
    ($variant:ident($target:ty): $($source:ty),+) => {
        $(
            impl From<$source> for Value {
                fn from(n: $source) -> Self {
                    Value::$variant(<$target>::from(n))
                }
            }
        )+
    };
}

impl_from_narrow!(Int(i64): i8, i16, i32);
impl_from_narrow!(UInt(u64): u8, u16, u32);
impl_from_narrow!(Float(f64): f32);

macro_rules! impl_from_ref {
    ($($source:ty),+) => {
        $(
            impl From<&$source> for Value {
                fn from(n: &$source) -> Self {
                    Value::from(*n)
                }
            }
        )+
    };
}

impl_from_ref!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool);

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::Strings(v)
    }
}

impl From<&[String]> for Value {
    fn from(v: &[String]) -> Self {
        Value::Strings(v.to_vec())
    }
}

impl<'a> From<Vec<&'a str>> for Value {
    fn from(v: Vec<&'a str>) -> Self {
        Value::Strings(v.into_iter().map(|s| s.to_string()).collect())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::Datetime(dt)
    }
}

impl From<&DateTime<Utc>> for Value {
    fn from(dt: &DateTime<Utc>) -> Self {
        Value::Datetime(*dt)
    }
}

impl From<serde_json::Value> for Value {
    fn from(doc: serde_json::Value) -> Self {
        Value::Document(doc)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
