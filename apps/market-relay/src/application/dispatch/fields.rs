//! Tolerant parameter mapping.
//!
//! Handlers declare their fields and read them through [`ParamReader`]. A key
//! that is absent or carries an unexpected variant yields the field's zero
//! value; the message is still dispatched.

use serde_json::{Map, Number};

use crate::domain::protocol::{Parameters, Value};

/// Builds a typed handler from a parameter dictionary.
pub trait FromParameters: Sized {
    /// Map parameters to fields, defaulting anything missing or mistyped.
    fn from_parameters(params: &ParamReader<'_>) -> Self;
}

/// One embedded record carried inside a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SubDocument {
    /// JSON text.
    Text(String),
    /// UTF-8 JSON bytes.
    Bytes(Vec<u8>),
    /// String-keyed dictionary.
    Fields(Map<String, serde_json::Value>),
    /// Anything else; carries the variant name for logging.
    Unsupported(&'static str),
}

impl SubDocument {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s.clone()),
            Value::Bytes(b) => Self::Bytes(b.clone()),
            Value::Dictionary(entries) => dictionary_to_map(entries)
                .map_or(Self::Unsupported("dictionary"), Self::Fields),
            other => Self::Unsupported(other.type_name()),
        }
    }
}

/// Lookup-with-default view over a parameter dictionary.
#[derive(Debug, Clone, Copy)]
pub struct ParamReader<'a> {
    params: &'a Parameters,
}

impl<'a> ParamReader<'a> {
    /// Wrap a parameter dictionary.
    #[must_use]
    pub const fn new(params: &'a Parameters) -> Self {
        Self { params }
    }

    /// Raw value for a key.
    #[must_use]
    pub fn raw(&self, key: u8) -> Option<&'a Value> {
        self.params.get(&key)
    }

    /// String field; empty when absent or not a string.
    #[must_use]
    pub fn string(&self, key: u8) -> String {
        self.raw(key)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_default()
    }

    /// Integer field; zero when absent or not integral.
    #[must_use]
    pub fn int(&self, key: u8) -> i64 {
        self.raw(key).and_then(Value::as_i64).unwrap_or_default()
    }

    /// Boolean field; false when absent or not a boolean.
    #[must_use]
    pub fn bool(&self, key: u8) -> bool {
        self.raw(key).and_then(Value::as_bool).unwrap_or_default()
    }

    /// Embedded documents from an array field; empty when absent or not an array.
    #[must_use]
    pub fn documents(&self, key: u8) -> Vec<SubDocument> {
        self.raw(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().map(SubDocument::from_value).collect())
            .unwrap_or_default()
    }
}

fn dictionary_to_map(entries: &[(Value, Value)]) -> Option<Map<String, serde_json::Value>> {
    let mut map = Map::with_capacity(entries.len());
    for (key, value) in entries {
        let Value::String(key) = key else {
            return None;
        };
        map.insert(key.clone(), to_json(value));
    }
    Some(map)
}

/// Convert a wire value to JSON for document parsing.
///
/// Non-finite floats become `null`; dictionaries with non-string keys use the
/// key's display form.
#[must_use]
pub fn to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Byte(_) | Value::Short(_) | Value::Int(_) | Value::Long(_) => {
            value.as_i64().map_or(Json::Null, |v| Json::Number(v.into()))
        }
        Value::Float(f) => Number::from_f64(f64::from(*f)).map_or(Json::Null, Json::Number),
        Value::Double(d) => Number::from_f64(*d).map_or(Json::Null, Json::Number),
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(b) => Json::Array(b.iter().map(|v| Json::Number((*v).into())).collect()),
        Value::Array(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Dictionary(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (key, value) in entries {
                let key = match key {
                    Value::String(s) => s.clone(),
                    other => match other.as_i64() {
                        Some(n) => n.to_string(),
                        None => other.type_name().to_string(),
                    },
                };
                map.insert(key, to_json(value));
            }
            Json::Object(map)
        }
    }
}
