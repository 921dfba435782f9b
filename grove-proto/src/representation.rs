//! Representation: ordered key-value snapshot of a resource

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A scalar attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    // Order matters: untagged tries variants top to bottom, so whole JSON
    // numbers land in Int and only fractional ones fall through to Double.
    Int(i64),
    Double(f64),
    Bool(bool),
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

/// Typed extraction from a [`Value`]
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => i32::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Double(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(v) => Some(v.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("payload is not a flat JSON object: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode representation: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Key-value snapshot of a resource's attributes.
///
/// Field order is insertion order and is kept on the wire.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Representation {
    uri: String,
    values: IndexMap<String, Value>,
}

impl Representation {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            values: IndexMap::new(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Insert or overwrite a field, keeping its original position
    pub fn set_value(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Typed lookup; `None` when the field is absent or has another type
    pub fn get_value<T: FromValue>(&self, key: &str) -> Option<T> {
        self.values.get(key).and_then(T::from_value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Encode the fields as a JSON object
    pub fn to_payload(&self) -> Result<Vec<u8>, PayloadError> {
        serde_json::to_vec(&self.values).map_err(PayloadError::Encode)
    }

    /// Decode a JSON object payload. An empty payload is an empty representation.
    pub fn from_payload(uri: impl Into<String>, payload: &[u8]) -> Result<Self, PayloadError> {
        let values = if payload.iter().all(u8::is_ascii_whitespace) {
            IndexMap::new()
        } else {
            serde_json::from_slice(payload).map_err(PayloadError::Decode)?
        };
        Ok(Self {
            uri: uri.into(),
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_access() {
        let mut rep = Representation::new("/grovepi/led");
        rep.set_value("red", 1);
        rep.set_value("name", "led");
        rep.set_value("temperature", 21.5);

        assert_eq!(rep.get_value::<i32>("red"), Some(1));
        assert_eq!(rep.get_value::<f64>("red"), Some(1.0));
        assert_eq!(rep.get_value::<String>("red"), None);
        assert_eq!(rep.get_value::<String>("name"), Some("led".to_string()));
        assert_eq!(rep.get_value::<i64>("temperature"), None);
        assert_eq!(rep.get_value::<i32>("missing"), None);
    }

    #[test]
    fn set_value_keeps_position() {
        let mut rep = Representation::new("/grovepi/led");
        rep.set_value("red", 0);
        rep.set_value("green", 0);
        rep.set_value("blue", 0);
        rep.set_value("red", 7);

        assert_eq!(rep.keys().collect::<Vec<_>>(), ["red", "green", "blue"]);
        assert_eq!(rep.to_payload().unwrap(), br#"{"red":7,"green":0,"blue":0}"#);
    }

    #[test]
    fn payload_number_kinds() {
        let rep = Representation::from_payload(
            "/grovepi/sensor",
            br#"{"light": 12, "temperature": 20.5, "on": true, "lcd": "hi"}"#,
        )
        .unwrap();

        assert_eq!(rep.get("light"), Some(&Value::Int(12)));
        assert_eq!(rep.get("temperature"), Some(&Value::Double(20.5)));
        assert_eq!(rep.get("on"), Some(&Value::Bool(true)));
        assert_eq!(rep.get("lcd"), Some(&Value::Str("hi".to_string())));
        assert_eq!(rep.keys().collect::<Vec<_>>(), ["light", "temperature", "on", "lcd"]);
    }

    #[test]
    fn empty_payload_is_empty_representation() {
        let rep = Representation::from_payload("/grovepi/lcd", b"").unwrap();
        assert!(rep.is_empty());
        assert_eq!(rep.uri(), "/grovepi/lcd");
    }

    #[test]
    fn nested_payload_rejected() {
        assert!(Representation::from_payload("/x", br#"{"a": [1, 2]}"#).is_err());
        assert!(Representation::from_payload("/x", br#"[1, 2]"#).is_err());
        assert!(Representation::from_payload("/x", b"not json").is_err());
    }
}
