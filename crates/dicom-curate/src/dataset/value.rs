//! Natural (keyword-keyed) dataset model.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::raw::{RawElement, RawValue};

/// Keyword-keyed attributes of one dataset or sequence item.
///
/// Attributes the dictionary cannot name (private and unknown elements)
/// are keyed by their 8-digit tag and carried as [`Value::Raw`], except
/// unnamed standard sequences, which keep their items in natural form.
pub type NaturalDataset = IndexMap<String, Value>;

/// An attribute value in natural form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Int(i64),
    Float(f64),
    Sequence(Vec<NaturalDataset>),
    Multi(Vec<Value>),
    Raw(RawElement),
    Bytes(Vec<u8>),
}

impl Value {
    /// Text content, if this is a single text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[NaturalDataset]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_sequence_mut(&mut self) -> Option<&mut Vec<NaturalDataset>> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Empty text, empty multi-value, empty sequence and zero-length raw
    /// elements count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Text(s) => s.is_empty(),
            Value::Multi(values) => values.is_empty(),
            Value::Sequence(items) => items.is_empty(),
            Value::Bytes(bytes) => bytes.is_empty(),
            Value::Raw(element) => element.value == RawValue::Empty,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Multi(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str("\\")?;
                    }
                    write!(f, "{}", v)?;
                }
                Ok(())
            }
            Value::Sequence(items) => write!(f, "[{} item(s)]", items.len()),
            Value::Raw(element) => write!(f, "<{} element>", element.vr),
            Value::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<Vec<NaturalDataset>> for Value {
    fn from(items: Vec<NaturalDataset>) -> Self {
        Value::Sequence(items)
    }
}
