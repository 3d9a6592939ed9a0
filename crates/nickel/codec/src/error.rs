use thiserror::Error;

/// Errors from encoding or decoding a Nickel frame.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("truncated frame: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("{field} segment too large: {size} bytes (max {max})")]
    SegmentTooLarge {
        field: &'static str,
        size: usize,
        max: usize,
    },

    #[error("{field} segment is not valid UTF-8: {source}")]
    Utf8 {
        field: &'static str,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("{field} segment is not valid JSON: {source}")]
    Json {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown nickel type '{0}'")]
    UnknownType(String),

    #[error("unknown nickel origin '{0}'")]
    UnknownOrigin(String),

    #[error("invalid correlation id '{value}': {source}")]
    InvalidCorrelationId {
        value: String,
        #[source]
        source: uuid::Error,
    },

    #[error("timestamp out of range: {0}")]
    InvalidTimestamp(i64),

    #[error("status code out of range: {0}")]
    InvalidStatus(i32),

    #[error("{0} unexpected bytes after the last segment")]
    TrailingBytes(usize),
}
