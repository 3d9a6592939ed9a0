use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use nickel_types::{Nickel, NickelOrigin, NickelParts, NickelType};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::CodecError;

/// Size of the fixed prefix: timestamp (i64) + status (i32).
pub const FIXED_PREFIX_SIZE: usize = 12;

/// Largest variable-length segment the codec will write or accept.
pub const MAX_SEGMENT_SIZE: usize = 16 * 1024 * 1024;

/// Length prefix marking an absent optional segment (type, orcid).
pub const ABSENT: u32 = u32::MAX;

/// Binary codec for Nickels crossing a process boundary.
///
/// Frame layout, all integers big-endian:
///
/// ```text
/// i64  timestamp (epoch ms)
/// i32  status code
/// u32+ correlation id      (hyphenated UUID)
/// u32+ type                (wire name, or ABSENT)
/// u32+ orcid               (or ABSENT)
/// u32+ origin              (wire name)
/// u32+ response headers    (JSON object)
/// u32+ request query params(JSON object)
/// u32+ tracing carrier     (JSON object)
/// u32+ payload             (raw bytes, length 0 when empty)
/// u32+ metadata            (JSON object, optional trailing segment)
/// ```
///
/// `u32+` is a u32 length followed by that many bytes. The fixed fields come
/// first so the timestamp and status can be read without a full decode.
#[derive(Clone, Copy, Debug, Default)]
pub struct NickelCodec;

impl NickelCodec {
    pub const NAME: &'static str = "NickelCodec";

    /// Codec identifier. Transport builtin codecs use non-negative ids.
    pub const CODEC_ID: i8 = -1;

    pub fn new() -> Self {
        Self
    }

    /// Encode a Nickel into a fresh buffer.
    pub fn encode(&self, nickel: &Nickel) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::with_capacity(FIXED_PREFIX_SIZE + 128 + nickel.payload().len());
        self.encode_into(nickel, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Append the encoded Nickel to `buf`. On error `buf` may hold a partial
    /// frame.
    pub fn encode_into(&self, nickel: &Nickel, buf: &mut BytesMut) -> Result<(), CodecError> {
        buf.put_i64(nickel.timestamp_millis());
        buf.put_i32(i32::from(nickel.status_code()));

        put_segment(buf, "correlationId", nickel.correlation_id().to_string().as_bytes())?;
        put_optional(buf, "type", nickel.kind().map(|k| k.name().as_bytes()))?;
        put_optional(buf, "orcid", nickel.orcid().map(str::as_bytes))?;
        put_segment(buf, "origin", nickel.origin().name().as_bytes())?;
        put_json(buf, "httpResponseHeaders", nickel.response_headers())?;
        put_json(buf, "requestQueryParameters", nickel.request_query_params())?;
        put_json(buf, "tracing", nickel.tracing_carrier())?;
        put_segment(buf, "payload", nickel.payload())?;
        put_json(buf, "metadata", nickel.metadata())?;
        Ok(())
    }

    /// Decode a complete frame.
    pub fn decode(&self, frame: &[u8]) -> Result<Nickel, CodecError> {
        let mut reader = Reader::new(frame);

        let millis = reader.i64()?;
        let timestamp = millis_to_datetime(millis)?;
        let raw_status = reader.i32()?;
        let status_code =
            u16::try_from(raw_status).map_err(|_| CodecError::InvalidStatus(raw_status))?;

        let raw_id = reader.str("correlationId")?;
        let correlation_id =
            Uuid::parse_str(raw_id).map_err(|source| CodecError::InvalidCorrelationId {
                value: raw_id.to_string(),
                source,
            })?;

        let kind = match reader.optional("type")? {
            Some(bytes) => {
                let name = utf8("type", bytes)?;
                Some(
                    name.parse::<NickelType>()
                        .map_err(|_| CodecError::UnknownType(name.to_string()))?,
                )
            }
            None => None,
        };

        let orcid = match reader.optional("orcid")? {
            Some(bytes) => Some(utf8("orcid", bytes)?.to_string()),
            None => None,
        };

        let origin_name = reader.str("origin")?;
        let origin = origin_name
            .parse::<NickelOrigin>()
            .map_err(|_| CodecError::UnknownOrigin(origin_name.to_string()))?;

        let response_headers: Map<String, Value> = reader.json("httpResponseHeaders")?;
        let request_query_params: Map<String, Value> = reader.json("requestQueryParameters")?;
        let tracing: BTreeMap<String, String> = reader.json("tracing")?;
        let payload = Bytes::copy_from_slice(reader.segment("payload")?);

        // Frames from writers that predate the metadata segment end here.
        let metadata: Map<String, Value> = if reader.is_empty() {
            Map::new()
        } else {
            reader.json("metadata")?
        };

        if !reader.is_empty() {
            return Err(CodecError::TrailingBytes(reader.remaining()));
        }

        Ok(Nickel::from_parts(NickelParts {
            correlation_id,
            timestamp,
            kind,
            origin,
            orcid,
            status_code,
            payload,
            response_headers,
            request_query_params,
            tracing,
            metadata,
        }))
    }

    /// Local delivery: consumers get an independent copy, no bytes involved.
    pub fn transform(&self, nickel: &Nickel) -> Nickel {
        nickel.clone()
    }
}

/// Read the timestamp of an encoded frame without decoding the rest.
pub fn peek_timestamp(frame: &[u8]) -> Result<DateTime<Utc>, CodecError> {
    let millis = Reader::new(frame).i64()?;
    millis_to_datetime(millis)
}

/// Read the status code of an encoded frame without decoding the rest.
pub fn peek_status(frame: &[u8]) -> Result<u16, CodecError> {
    let mut reader = Reader::new(frame);
    reader.skip(8)?;
    let raw = reader.i32()?;
    u16::try_from(raw).map_err(|_| CodecError::InvalidStatus(raw))
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, CodecError> {
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or(CodecError::InvalidTimestamp(millis))
}

fn put_segment(buf: &mut BytesMut, field: &'static str, bytes: &[u8]) -> Result<(), CodecError> {
    if bytes.len() > MAX_SEGMENT_SIZE {
        return Err(CodecError::SegmentTooLarge {
            field,
            size: bytes.len(),
            max: MAX_SEGMENT_SIZE,
        });
    }
    // MAX_SEGMENT_SIZE is far below u32::MAX, so the cast is lossless.
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
    Ok(())
}

fn put_optional(
    buf: &mut BytesMut,
    field: &'static str,
    bytes: Option<&[u8]>,
) -> Result<(), CodecError> {
    match bytes {
        Some(bytes) => put_segment(buf, field, bytes),
        None => {
            buf.put_u32(ABSENT);
            Ok(())
        }
    }
}

fn put_json<T: serde::Serialize>(
    buf: &mut BytesMut,
    field: &'static str,
    value: &T,
) -> Result<(), CodecError> {
    let encoded = serde_json::to_vec(value).map_err(|source| CodecError::Json { field, source })?;
    put_segment(buf, field, &encoded)
}

fn utf8<'a>(field: &'static str, bytes: &'a [u8]) -> Result<&'a str, CodecError> {
    std::str::from_utf8(bytes).map_err(|source| CodecError::Utf8 { field, source })
}

/// Cursor over a frame that reports truncation with its offset.
struct Reader<'a> {
    frame: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(frame: &'a [u8]) -> Self {
        Self { frame, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.frame.len() - self.offset
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < needed {
            return Err(CodecError::Truncated {
                offset: self.offset,
                needed,
                available: self.remaining(),
            });
        }
        let bytes = &self.frame[self.offset..self.offset + needed];
        self.offset += needed;
        Ok(bytes)
    }

    fn skip(&mut self, n: usize) -> Result<(), CodecError> {
        self.take(n).map(|_| ())
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn sized(&mut self, field: &'static str, len: u32) -> Result<&'a [u8], CodecError> {
        let len = len as usize;
        if len > MAX_SEGMENT_SIZE {
            return Err(CodecError::SegmentTooLarge {
                field,
                size: len,
                max: MAX_SEGMENT_SIZE,
            });
        }
        self.take(len)
    }

    fn segment(&mut self, field: &'static str) -> Result<&'a [u8], CodecError> {
        let len = self.u32()?;
        self.sized(field, len)
    }

    fn optional(&mut self, field: &'static str) -> Result<Option<&'a [u8]>, CodecError> {
        match self.u32()? {
            ABSENT => Ok(None),
            len => self.sized(field, len).map(Some),
        }
    }

    fn str(&mut self, field: &'static str) -> Result<&'a str, CodecError> {
        let bytes = self.segment(field)?;
        utf8(field, bytes)
    }

    fn json<T: serde::de::DeserializeOwned>(
        &mut self,
        field: &'static str,
    ) -> Result<T, CodecError> {
        let bytes = self.segment(field)?;
        serde_json::from_slice(bytes).map_err(|source| CodecError::Json { field, source })
    }
}
