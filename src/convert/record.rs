//! Row and record types on either side of the converter.
//!
//! A [`Row`] is what the query source hands us: column name to a dynamically typed
//! scalar. A [`Record`] is what downstream training code consumes: column name to a
//! typed feature list, or an explicit empty marker when the source value was null.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// A single scalar value from the query source
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Value {
    /// Name of the dynamic kind, used in type mismatch errors
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
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

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One raw row from the query source
pub type Row = BTreeMap<String, Value>;

/// A typed feature in an output record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Int64List(Vec<i64>),
    /// Non-finite values serialize as the strings `"NaN"`, `"Infinity"` and `"-Infinity"`
    FloatList(#[serde(serialize_with = "serialize_float_list")] Vec<f32>),
    BytesList(#[serde(serialize_with = "serialize_bytes_list")] Vec<Vec<u8>>),
    /// The source value was null; carries no value of any kind.
    Empty,
}

impl Feature {
    pub fn is_empty(&self) -> bool {
        matches!(self, Feature::Empty)
    }
}

// JSON has no literal for NaN or the infinities
#[allow(clippy::ptr_arg)]
fn serialize_float_list<S: Serializer>(
    values: &Vec<f32>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(values.len()))?;
    for value in values {
        match *value {
            v if v.is_finite() => seq.serialize_element(&v)?,
            v if v.is_nan() => seq.serialize_element("NaN")?,
            v if v > 0.0 => seq.serialize_element("Infinity")?,
            _ => seq.serialize_element("-Infinity")?,
        }
    }
    seq.end()
}

#[allow(clippy::ptr_arg)]
fn serialize_bytes_list<S: Serializer>(
    values: &Vec<Vec<u8>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(values.len()))?;
    for value in values {
        seq.serialize_element(&STANDARD.encode(value))?;
    }
    seq.end()
}

/// Structured output of converting one row: exactly one feature per schema column
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    features: BTreeMap<String, Feature>,
}

impl Record {
    pub(crate) fn with_features(features: BTreeMap<String, Feature>) -> Self {
        Self { features }
    }

    pub fn get(&self, column: &str) -> Option<&Feature> {
        self.features.get(column)
    }

    /// Features in column name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Feature)> {
        self.features.iter().map(|(name, feature)| (name.as_str(), feature))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
