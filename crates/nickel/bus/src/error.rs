use nickel_codec::CodecError;
use thiserror::Error;

/// Bus delivery errors.
///
/// Publishing is fire-and-forget, so these surface in logs and to codec
/// callers rather than to publishers.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("no codec registered for clustered delivery")]
    NoCodec,

    #[error("no async runtime available for delivery")]
    NoRuntime,
}
