//! A `serde_json::Value`-shaped tree that also carries a `Binary` leaf.
//!
//! `serde_json::Value` has no byte-string variant, so content that mixes
//! JSON values with raw binary (as embedded CRDT payloads sometimes do)
//! needs its own little tree type. [`JsonBinary`] is that type; it is used
//! by [`deep_equal_binary`](crate::json_equal::deep_equal_binary) wherever
//! binary leaves must compare equal by content rather than by reference.

use std::collections::BTreeMap;

/// A JSON-like value that can additionally hold a raw byte buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonBinary {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<JsonBinary>),
    Object(BTreeMap<String, JsonBinary>),
}

impl From<&serde_json::Value> for JsonBinary {
    fn from(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => JsonBinary::Null,
            serde_json::Value::Bool(b) => JsonBinary::Bool(*b),
            serde_json::Value::Number(n) => JsonBinary::Number(n.clone()),
            serde_json::Value::String(s) => JsonBinary::String(s.clone()),
            serde_json::Value::Array(a) => JsonBinary::Array(a.iter().map(JsonBinary::from).collect()),
            serde_json::Value::Object(o) => JsonBinary::Object(
                o.iter()
                    .map(|(k, v)| (k.clone(), JsonBinary::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_nested_value() {
        let v = serde_json::json!({"a": [1, "x", null, true]});
        let jb = JsonBinary::from(&v);
        match jb {
            JsonBinary::Object(m) => assert!(matches!(m.get("a"), Some(JsonBinary::Array(_)))),
            _ => panic!("expected object"),
        }
    }
}
