use nickel_bus::{Bus, Headers};
use nickel_types::Nickel;
use serde_json::Value;
use tracing::debug;

/// Header carrying the hyphenated correlation id.
pub const CORRELATION_ID_HEADER: &str = "correlationId";
/// Header carrying the type wire name. Omitted for untyped Nickels.
pub const TYPE_HEADER: &str = "type";

/// Transport headers for a Nickel: correlation id, type and the flat
/// projection of its metadata.
///
/// Metadata strings are copied as-is; numbers and booleans are rendered with
/// their JSON text. Nulls, objects and arrays have no flat form and are
/// skipped.
pub fn envelope_headers(nickel: &Nickel) -> Headers {
    let mut headers = Headers::new();
    for (key, value) in nickel.metadata() {
        let flat = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null | Value::Object(_) | Value::Array(_) => continue,
        };
        headers.insert(key.as_str(), flat);
    }
    // Routing headers win over metadata entries of the same name.
    headers.insert(CORRELATION_ID_HEADER, nickel.correlation_id().to_string());
    if let Some(kind) = nickel.kind() {
        headers.insert(TYPE_HEADER, kind.name());
    }
    headers
}

/// Fire-and-forget publish to `address`.
pub fn publish<B: Bus + ?Sized>(bus: &B, address: &str, nickel: Nickel) {
    let headers = envelope_headers(&nickel);
    debug!(
        address,
        correlation_id = %nickel.correlation_id(),
        kind = ?nickel.kind(),
        "Publishing nickel"
    );
    bus.publish(address, nickel, headers);
}

#[cfg(test)]
mod tests {
    use super::*;
    use nickel_types::NickelType;
    use serde_json::json;

    #[test]
    fn routing_headers() {
        let nickel = Nickel::create().with_type(NickelType::CreateTask);
        let headers = envelope_headers(&nickel);
        assert_eq!(
            headers.get(CORRELATION_ID_HEADER),
            Some(nickel.correlation_id().to_string().as_str())
        );
        assert_eq!(headers.get(TYPE_HEADER), Some("CREATE_TASK"));
    }

    #[test]
    fn untyped_nickel_has_no_type_header() {
        let headers = envelope_headers(&Nickel::create());
        assert!(!headers.contains_key(TYPE_HEADER));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn metadata_projection() {
        let metadata = json!({
            "fileName": "cruise.csv",
            "rows": 1200,
            "ratio": 0.25,
            "validated": true,
            "missing": null,
            "nested": {"a": 1},
            "list": [1, 2],
        });
        let nickel = Nickel::create().with_metadata(metadata.as_object().unwrap().clone());
        let headers = envelope_headers(&nickel);

        assert_eq!(headers.get("fileName"), Some("cruise.csv"));
        assert_eq!(headers.get("rows"), Some("1200"));
        assert_eq!(headers.get("ratio"), Some("0.25"));
        assert_eq!(headers.get("validated"), Some("true"));
        assert!(!headers.contains_key("missing"));
        assert!(!headers.contains_key("nested"));
        assert!(!headers.contains_key("list"));
    }

    #[test]
    fn metadata_cannot_spoof_correlation_id() {
        let nickel = Nickel::create().with_metadata(
            json!({"correlationId": "spoofed"}).as_object().unwrap().clone(),
        );
        let headers = envelope_headers(&nickel);
        assert_eq!(
            headers.get(CORRELATION_ID_HEADER),
            Some(nickel.correlation_id().to_string().as_str())
        );
    }
}
