//! Deterministic encoding
//!
//! Object keys are sorted recursively before encoding, so equal state always yields equal
//! frames and equal hashes.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::Serialize;
use serde_json::{Map, Value};

use super::Message;
use crate::error::Result;

pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(key, value)| (key, canonicalize(value))).collect();
            let mut out = Map::new();
            for (key, value) in sorted {
                out.insert(key.clone(), value);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

pub fn encode<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&canonicalize(&value))?)
}

pub fn decode_message(frame: &str) -> Result<Message> {
    Ok(serde_json::from_str(frame)?)
}

pub fn decode_batch(frame: &str) -> Result<Vec<Message>> {
    Ok(serde_json::from_str(frame)?)
}

/// Change-detection hash over the canonical encoding of `value`.
pub fn state_hash(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    canonicalize(value).to_string().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_key_order_does_not_change_encoding() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": 2, "x": [ {"d": 1, "c": 2} ]}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": [ {"c": 2, "d": 1} ], "y": 2}, "b": 1}"#).unwrap();
        assert_eq!(encode(&a).unwrap(), encode(&b).unwrap());
        assert_eq!(state_hash(&a), state_hash(&b));
        assert_eq!(encode(&a).unwrap(), r#"{"a":{"x":[{"c":2,"d":1}],"y":2},"b":1}"#);
    }

    #[test]
    fn test_hash_tracks_changes() {
        let before = json!({ "center": { "x": 1.0, "y": 2.0 } });
        let after = json!({ "center": { "x": 1.0, "y": 2.5 } });
        assert_ne!(state_hash(&before), state_hash(&after));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_message("not json").is_err());
        assert!(decode_batch(r#"{"type": "NEW_INPUT", "body": "w"}"#).is_err());
        assert_eq!(
            decode_batch(r#"[{"type": "NEW_INPUT", "body": "w"}]"#).unwrap(),
            vec![Message::NewInput("w".to_string())]
        );
    }
}
