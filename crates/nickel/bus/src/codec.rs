use bytes::Bytes;
use nickel_codec::NickelCodec;
use nickel_types::Nickel;

use crate::error::BusError;

/// A codec the bus uses when a Nickel crosses a process boundary.
pub trait MessageCodec: Send + Sync {
    /// Unique name the transport selects the codec by.
    fn name(&self) -> &'static str;

    /// Transport codec id. Builtin transport codecs use non-negative ids.
    fn id(&self) -> i8;

    fn encode(&self, nickel: &Nickel) -> Result<Bytes, BusError>;

    fn decode(&self, frame: &[u8]) -> Result<Nickel, BusError>;

    /// Local delivery, no bytes involved.
    fn transform(&self, nickel: &Nickel) -> Nickel;
}

impl MessageCodec for NickelCodec {
    fn name(&self) -> &'static str {
        NickelCodec::NAME
    }

    fn id(&self) -> i8 {
        NickelCodec::CODEC_ID
    }

    fn encode(&self, nickel: &Nickel) -> Result<Bytes, BusError> {
        Ok(NickelCodec::encode(self, nickel)?)
    }

    fn decode(&self, frame: &[u8]) -> Result<Nickel, BusError> {
        Ok(NickelCodec::decode(self, frame)?)
    }

    fn transform(&self, nickel: &Nickel) -> Nickel {
        NickelCodec::transform(self, nickel)
    }
}
