//! Correlation protocol over a Nickel bus.
//!
//! - [`publish`]: fire-and-forget, with `correlationId`/`type` headers and
//!   flat metadata headers
//! - [`send`]: publish and wait for the reply sharing the correlation id
//! - [`send_with_timeout`]: as `send`, but a TIMEOUT Nickel is synthesized
//!   when nothing terminal arrives in time
//! - [`send_all`]: fan out a [`NickelBatch`] and wait for every reply
//!
//! Remote failures come back as data (an ERROR Nickel) and surface to the
//! caller as [`SendError::ErrorNickel`].

pub mod batch;
pub mod config;
pub mod error;
pub mod publish;
pub mod send;

pub use batch::NickelBatch;
pub use config::ProtocolConfig;
pub use error::SendError;
pub use publish::{envelope_headers, publish, CORRELATION_ID_HEADER, TYPE_HEADER};
pub use send::{
    send, send_all, send_all_with_timeout, send_with_default_timeout, send_with_timeout,
    PendingReply,
};
