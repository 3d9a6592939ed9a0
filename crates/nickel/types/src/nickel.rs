use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::NickelError;
use crate::kind::{NickelOrigin, NickelType};

/// Principal used when an action is internal to the services and not
/// performed on behalf of a logged-in user.
pub const SYSTEM_ORCID: &str = "0000-0000-0000-0000";

/// Status code of a freshly created Nickel.
pub const DEFAULT_STATUS: u16 = 200;
/// Status code set by [`Nickel::for_error`].
pub const ERROR_STATUS: u16 = 500;
/// Status code set by [`Nickel::for_timeout`].
pub const TIMEOUT_STATUS: u16 = 504;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const APPLICATION_JSON: &str = "application/json";

/// The message unit exchanged between services over the bus.
///
/// A Nickel is a value: the bus takes its own copy on publish, so mutating a
/// Nickel after it has been sent never affects dispatched copies.
///
/// The correlation id is generated once at creation and inherited by every
/// Nickel derived from this one (reply, error and timeout variants), which is
/// how a waiter matches replies to its request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nickel {
    correlation_id: Uuid,
    #[serde(with = "millis_rfc3339")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "type", default)]
    kind: Option<NickelType>,
    #[serde(default)]
    origin: NickelOrigin,
    #[serde(default)]
    orcid: Option<String>,
    #[serde(default = "default_status")]
    status_code: u16,
    #[serde(default)]
    payload: Bytes,
    #[serde(rename = "httpResponseHeaders", default)]
    response_headers: Map<String, Value>,
    #[serde(rename = "requestQueryParameters", default)]
    request_query_params: Map<String, Value>,
    #[serde(default)]
    tracing: BTreeMap<String, String>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

fn default_status() -> u16 {
    DEFAULT_STATUS
}

/// Every field of a Nickel, for transports and codecs that rebuild one from
/// its wire form.
#[derive(Clone, Debug, PartialEq)]
pub struct NickelParts {
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: Option<NickelType>,
    pub origin: NickelOrigin,
    pub orcid: Option<String>,
    pub status_code: u16,
    pub payload: Bytes,
    pub response_headers: Map<String, Value>,
    pub request_query_params: Map<String, Value>,
    pub tracing: BTreeMap<String, String>,
    pub metadata: Map<String, Value>,
}

impl Nickel {
    /// Create a Nickel with a fresh correlation id and timestamp, status 200,
    /// no type, no principal and an unspecified origin.
    pub fn create() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            timestamp: truncate_to_millis(Utc::now()),
            kind: None,
            origin: NickelOrigin::Unspecified,
            orcid: None,
            status_code: DEFAULT_STATUS,
            payload: Bytes::new(),
            response_headers: Map::new(),
            request_query_params: Map::new(),
            tracing: BTreeMap::new(),
            metadata: Map::new(),
        }
    }

    /// Create a fully populated Nickel.
    pub fn create_with(orcid: impl Into<String>, kind: NickelType, origin: NickelOrigin) -> Self {
        Self::create()
            .with_orcid(orcid)
            .with_type(kind)
            .with_origin(origin)
    }

    /// A new Nickel inheriting correlation id, status, timestamp and orcid
    /// from `src`. Type and origin are reset; payload and maps start empty.
    pub fn derive(src: &Nickel) -> Self {
        Self {
            correlation_id: src.correlation_id,
            timestamp: src.timestamp,
            kind: None,
            origin: NickelOrigin::Unspecified,
            orcid: src.orcid.clone(),
            status_code: src.status_code,
            payload: Bytes::new(),
            response_headers: Map::new(),
            request_query_params: Map::new(),
            tracing: BTreeMap::new(),
            metadata: Map::new(),
        }
    }

    /// A RESPONSE Nickel for `src`, ready to be customized and returned.
    pub fn for_reply(src: &Nickel) -> Self {
        Self::derive(src).with_type(NickelType::Response)
    }

    /// A RESPONSE Nickel for `src` stamped with the replying service.
    pub fn for_reply_from(src: &Nickel, origin: NickelOrigin) -> Self {
        Self::for_reply(src).with_origin(origin)
    }

    /// An ERROR Nickel for `src` with status 500.
    pub fn for_error(src: &Nickel) -> Self {
        Self::derive(src)
            .with_type(NickelType::Error)
            .with_status(ERROR_STATUS)
    }

    /// A TIMEOUT Nickel for `src` with status 504, issued by the system.
    pub fn for_timeout(src: &Nickel) -> Self {
        Self::derive(src)
            .with_type(NickelType::Timeout)
            .with_status(TIMEOUT_STATUS)
            .with_orcid(SYSTEM_ORCID)
    }

    /// Rebuild a Nickel from its parts. The timestamp is truncated to
    /// millisecond precision.
    pub fn from_parts(parts: NickelParts) -> Self {
        Self {
            correlation_id: parts.correlation_id,
            timestamp: truncate_to_millis(parts.timestamp),
            kind: parts.kind,
            origin: parts.origin,
            orcid: parts.orcid,
            status_code: parts.status_code,
            payload: parts.payload,
            response_headers: parts.response_headers,
            request_query_params: parts.request_query_params,
            tracing: parts.tracing,
            metadata: parts.metadata,
        }
    }

    pub fn into_parts(self) -> NickelParts {
        NickelParts {
            correlation_id: self.correlation_id,
            timestamp: self.timestamp,
            kind: self.kind,
            origin: self.origin,
            orcid: self.orcid,
            status_code: self.status_code,
            payload: self.payload,
            response_headers: self.response_headers,
            request_query_params: self.request_query_params,
            tracing: self.tracing,
            metadata: self.metadata,
        }
    }

    /// Build a Nickel from its structured (JSON) form.
    ///
    /// `correlationId` and `timestamp` are required; a missing required field
    /// or a malformed value is an illegal-format error, never a partially
    /// initialized Nickel.
    pub fn from_json(value: Value) -> Result<Self, NickelError> {
        serde_json::from_value(value).map_err(|e| NickelError::IllegalFormat(e.to_string()))
    }

    pub fn to_json(&self) -> Result<Value, NickelError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Diagnostic view for logs. Reports the payload size, not its content.
    pub fn summary(&self) -> Value {
        serde_json::json!({
            "correlationId": self.correlation_id.to_string(),
            "timestamp": self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "metadata": self.metadata,
            "orcid": self.orcid,
            "type": self.kind.map(NickelType::name),
            "origin": self.origin.name(),
            "statusCode": self.status_code,
            "requestQueryParameters": self.request_query_params,
            "httpResponseHeaders": self.response_headers,
            "payloadSize": self.payload.len(),
        })
    }

    // ---- accessors ----

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Creation time in epoch milliseconds.
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    pub fn kind(&self) -> Option<NickelType> {
        self.kind
    }

    /// True when the Nickel's type closes a request.
    pub fn is_terminal(&self) -> bool {
        self.kind.is_some_and(NickelType::is_terminal)
    }

    pub fn origin(&self) -> NickelOrigin {
        self.origin
    }

    pub fn orcid(&self) -> Option<&str> {
        self.orcid.as_deref()
    }

    pub fn is_system(&self) -> bool {
        self.orcid.as_deref() == Some(SYSTEM_ORCID)
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn response_headers(&self) -> &Map<String, Value> {
        &self.response_headers
    }

    pub fn response_headers_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.response_headers
    }

    pub fn request_query_params(&self) -> &Map<String, Value> {
        &self.request_query_params
    }

    pub fn request_query_params_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.request_query_params
    }

    /// The tracing carrier. Only tracing propagation writes to it.
    pub fn tracing_carrier(&self) -> &BTreeMap<String, String> {
        &self.tracing
    }

    pub fn tracing_carrier_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.tracing
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.metadata
    }

    // ---- setters ----

    pub fn set_type(&mut self, kind: NickelType) -> &mut Self {
        self.kind = Some(kind);
        self
    }

    pub fn set_origin(&mut self, origin: NickelOrigin) -> &mut Self {
        self.origin = origin;
        self
    }

    pub fn set_orcid(&mut self, orcid: impl Into<String>) -> &mut Self {
        self.orcid = Some(orcid.into());
        self
    }

    pub fn set_status(&mut self, status_code: u16) -> &mut Self {
        self.status_code = status_code;
        self
    }

    pub fn set_metadata(&mut self, metadata: Map<String, Value>) -> &mut Self {
        self.metadata = metadata;
        self
    }

    pub fn set_request_query_params(&mut self, params: Map<String, Value>) -> &mut Self {
        self.request_query_params = params;
        self
    }

    pub fn set_response_headers(&mut self, headers: Map<String, Value>) -> &mut Self {
        self.response_headers = headers;
        self
    }

    pub fn with_type(mut self, kind: NickelType) -> Self {
        self.set_type(kind);
        self
    }

    pub fn with_origin(mut self, origin: NickelOrigin) -> Self {
        self.set_origin(origin);
        self
    }

    pub fn with_orcid(mut self, orcid: impl Into<String>) -> Self {
        self.set_orcid(orcid);
        self
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.set_status(status_code);
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.set_metadata(metadata);
        self
    }

    pub fn with_request_query_params(mut self, params: Map<String, Value>) -> Self {
        self.set_request_query_params(params);
        self
    }

    pub fn with_response_headers(mut self, headers: Map<String, Value>) -> Self {
        self.set_response_headers(headers);
        self
    }

    // ---- payload ----

    /// Replace the payload with raw bytes.
    pub fn pack_bytes(&mut self, bytes: impl Into<Bytes>) -> &mut Self {
        self.payload = bytes.into();
        self
    }

    /// Replace the payload with the JSON encoding of `object` and mark the
    /// content type as JSON.
    pub fn pack_object(&mut self, object: &Map<String, Value>) -> &mut Self {
        let encoded = Value::Object(object.clone()).to_string();
        self.pack_json_text(encoded)
    }

    /// Replace the payload with the JSON encoding of `array` and mark the
    /// content type as JSON.
    pub fn pack_array(&mut self, array: &[Value]) -> &mut Self {
        let encoded = Value::Array(array.to_vec()).to_string();
        self.pack_json_text(encoded)
    }

    /// Replace the payload with the JSON encoding of any serializable value.
    pub fn pack_json<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<&mut Self, NickelError> {
        let encoded = serde_json::to_string(value)?;
        Ok(self.pack_json_text(encoded))
    }

    /// Owned variant of [`Nickel::pack_object`], handy when returning a reply.
    pub fn packed_object(mut self, object: &Map<String, Value>) -> Self {
        self.pack_object(object);
        self
    }

    fn pack_json_text(&mut self, encoded: String) -> &mut Self {
        self.response_headers.insert(
            CONTENT_TYPE.to_string(),
            Value::String(APPLICATION_JSON.to_string()),
        );
        self.payload = Bytes::from(encoded.into_bytes());
        self
    }
}

impl Default for Nickel {
    fn default() -> Self {
        Self::create()
    }
}

/// Drop sub-millisecond precision; the wire carries epoch milliseconds.
pub fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = (ts.nanosecond() / 1_000_000) * 1_000_000;
    ts.with_nanosecond(nanos).unwrap_or(ts)
}

mod millis_rfc3339 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        ts.to_rfc3339_opts(SecondsFormat::Millis, true)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| super::truncate_to_millis(ts.with_timezone(&Utc)))
            .map_err(|e| serde::de::Error::custom(format!("unparsable timestamp '{raw}': {e}")))
    }
}
