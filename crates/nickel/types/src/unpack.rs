//! Payload decoding.
//!
//! The payload is opaque bytes; callers name the shape they expect by type.
//! A payload that does not decode into the requested shape is an
//! [`UnpackError`] carrying the Nickel, never a silent empty value.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::UnpackError;
use crate::nickel::Nickel;

/// A shape a Nickel payload can be unpacked into.
pub trait Unpack: Sized {
    /// Name reported in unpack errors.
    const KIND: &'static str;

    fn unpack_from(payload: &Bytes) -> Result<Self, String>;
}

impl Unpack for Map<String, Value> {
    const KIND: &'static str = "JsonObject";

    fn unpack_from(payload: &Bytes) -> Result<Self, String> {
        match serde_json::from_slice::<Value>(payload).map_err(|e| e.to_string())? {
            Value::Object(map) => Ok(map),
            other => Err(format!("expected a JSON object, found {}", json_kind(&other))),
        }
    }
}

impl Unpack for Vec<Value> {
    const KIND: &'static str = "JsonArray";

    fn unpack_from(payload: &Bytes) -> Result<Self, String> {
        match serde_json::from_slice::<Value>(payload).map_err(|e| e.to_string())? {
            Value::Array(items) => Ok(items),
            other => Err(format!("expected a JSON array, found {}", json_kind(&other))),
        }
    }
}

impl Unpack for Bytes {
    const KIND: &'static str = "Buffer";

    fn unpack_from(payload: &Bytes) -> Result<Self, String> {
        Ok(payload.clone())
    }
}

impl Unpack for String {
    const KIND: &'static str = "String";

    fn unpack_from(payload: &Bytes) -> Result<Self, String> {
        String::from_utf8(payload.to_vec()).map_err(|e| e.to_string())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl Nickel {
    /// Decode the payload into `T`.
    ///
    /// ```ignore
    /// let body: serde_json::Map<String, Value> = nickel.unpack()?;
    /// ```
    pub fn unpack<T: Unpack>(&self) -> Result<T, UnpackError> {
        T::unpack_from(self.payload()).map_err(|reason| UnpackError::new(self, T::KIND, reason))
    }

    /// Deserialize a JSON payload straight into a typed message.
    pub fn unpack_json<T: DeserializeOwned>(&self) -> Result<T, UnpackError> {
        serde_json::from_slice(self.payload())
            .map_err(|e| UnpackError::new(self, std::any::type_name::<T>(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn unpack_object() {
        let mut n = Nickel::create();
        n.pack_object(json!({"dataset": "argo", "rows": 3}).as_object().unwrap());
        let map: Map<String, Value> = n.unpack().unwrap();
        assert_eq!(map["dataset"], json!("argo"));
        assert_eq!(map["rows"], json!(3));
    }

    #[test]
    fn unpack_array() {
        let mut n = Nickel::create();
        n.pack_array(&[json!(1), json!("two")]);
        let items: Vec<Value> = n.unpack().unwrap();
        assert_eq!(items, vec![json!(1), json!("two")]);
    }

    #[test]
    fn unpack_bytes_is_verbatim() {
        let mut n = Nickel::create();
        n.pack_bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        let raw: Bytes = n.unpack().unwrap();
        assert_eq!(raw.as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn unpack_wrong_shape_carries_nickel() {
        let mut n = Nickel::create();
        n.pack_array(&[json!(1)]);
        let err = n.unpack::<Map<String, Value>>().unwrap_err();
        assert_eq!(err.kind, "JsonObject");
        assert_eq!(err.nickel.correlation_id(), n.correlation_id());
        assert!(err.reason.contains("an array"));
    }

    #[test]
    fn unpack_empty_payload_fails() {
        let n = Nickel::create();
        assert!(n.unpack::<Vec<Value>>().is_err());
        assert!(n.unpack::<Bytes>().unwrap().is_empty());
    }

    #[test]
    fn unpack_typed() {
        #[derive(Deserialize)]
        struct Task {
            name: String,
        }
        let mut n = Nickel::create();
        n.pack_json(&json!({"name": "ingest"})).unwrap();
        let task: Task = n.unpack_json().unwrap();
        assert_eq!(task.name, "ingest");

        n.pack_bytes(&b"not json"[..]);
        assert!(n.unpack_json::<Task>().is_err());
    }
}
