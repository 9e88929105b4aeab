use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Number;

/// JSON could not be parsed into a [`Value`].
#[derive(Debug, thiserror::Error)]
#[error("malformed JSON: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// An untyped, JSON-shaped value.
///
/// Values are never mutated in place by this crate; every transformation
/// builds a new tree. Equality is structural: maps compare by key set and
/// pairwise values regardless of insertion order, lists compare in order.
/// Numbers compare by their decimal text, see [`crate::semantically_equal`]
/// for a comparison that ignores number formatting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    /// Exact decimal text, never rounded through `f64`.
    Number(Number),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// Parse a JSON document.
pub fn decode(bytes: &[u8]) -> Result<Value, DecodeError> {
    let json: serde_json::Value = serde_json::from_slice(bytes)?;
    Ok(Value::from(json))
}

impl Value {
    /// Serialize to compact JSON. Never fails: every `Value` is representable.
    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a key; `None` for missing keys and for non-map values.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// A short name for the node kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // serde_json's Display for its own Value is infallible compact JSON
        fmt::Display::fmt(&serde_json::Value::from(self.clone()), f)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Value::Number(n),
            Value::String(s) => serde_json::Value::String(s),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
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

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Value::Map(entries)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) => serializer.collect_seq(items),
            Value::Map(entries) => serializer.collect_map(entries),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_encode_roundtrip() {
        let samples = [
            "null",
            "true",
            r#""text with \"quotes\" and é""#,
            "[1,[2,[3]],{}]",
            r#"{"b":{"c":[null,false]},"a":"x"}"#,
        ];
        for sample in samples {
            let value = decode(sample.as_bytes()).unwrap();
            let again = decode(&value.encode()).unwrap();
            assert_eq!(value, again, "roundtrip of {}", sample);
        }
    }

    #[test]
    fn large_integers_are_not_rounded() {
        let text = "12345678901234567890123456789";
        let value = decode(text.as_bytes()).unwrap();
        assert_eq!(String::from_utf8(value.encode()).unwrap(), text);

        let decimal = decode(b"0.10000000000000000000001").unwrap();
        assert_eq!(decimal.to_string(), "0.10000000000000000000001");
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        assert!(decode(b"{\"a\":").is_err());
        assert!(decode(b"").is_err());
        assert!(decode(b"{} trailing").is_err());
    }

    #[test]
    fn map_equality_ignores_key_order() {
        let a = decode(br#"{"a":1,"b":2}"#).unwrap();
        let b = decode(br#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn list_equality_respects_order() {
        let a = decode(b"[1,2]").unwrap();
        let b = decode(b"[2,1]").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn serde_matches_codec() {
        let value = Value::from(json!({"id": "X1", "n": [1, 2.5, null]}));
        let via_serde = serde_json::to_string(&value).unwrap();
        assert_eq!(via_serde.as_bytes(), value.encode().as_slice());
        let back: Value = serde_json::from_str(&via_serde).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn accessors() {
        let value = Value::from(json!({"id": "X1", "nested": {"k": true}}));
        assert_eq!(value.get("id").and_then(Value::as_str), Some("X1"));
        assert_eq!(value.get("missing"), None);
        assert_eq!(Value::from("x").get("id"), None);
        assert_eq!(value.kind(), "map");
        assert!(Value::default().is_null());
    }
}
