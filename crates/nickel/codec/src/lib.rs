//! Wire codec for Nickels.
//!
//! Transports that need a flat byte representation (a clustered bus, a
//! socket) encode a Nickel with [`NickelCodec`] and decode it on the other
//! side. Decoding reconstructs the same logical Nickel, field for field.

pub mod codec;
pub mod error;

pub use codec::{
    peek_status, peek_timestamp, NickelCodec, ABSENT, FIXED_PREFIX_SIZE, MAX_SEGMENT_SIZE,
};
pub use error::CodecError;
