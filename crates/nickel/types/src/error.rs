use thiserror::Error;

use crate::nickel::Nickel;

/// Errors from the Nickel envelope model.
#[derive(Error, Debug)]
pub enum NickelError {
    #[error(transparent)]
    Unpack(#[from] UnpackError),

    /// A structured representation is missing a field or carries a
    /// malformed value.
    #[error("illegal nickel format: {0}")]
    IllegalFormat(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The payload could not be decoded into the requested kind.
///
/// Carries the offending Nickel so the caller can log or reply to it.
#[derive(Error, Debug)]
#[error("could not unpack {kind} out of nickel {id}: {reason}", id = .nickel.correlation_id())]
pub struct UnpackError {
    pub nickel: Box<Nickel>,
    pub kind: &'static str,
    pub reason: String,
}

impl UnpackError {
    pub fn new(nickel: &Nickel, kind: &'static str, reason: impl Into<String>) -> Self {
        Self {
            nickel: Box::new(nickel.clone()),
            kind,
            reason: reason.into(),
        }
    }
}
