use nickel_types::Nickel;
use thiserror::Error;

/// Why a correlated send did not yield a reply.
#[derive(Debug, Error)]
pub enum SendError {
    /// The responder answered with an ERROR Nickel.
    #[error("nickel {} failed remotely with status {}", .0.correlation_id(), .0.status_code())]
    ErrorNickel(Box<Nickel>),

    /// The waiting consumer went away before any terminal Nickel arrived.
    #[error("reply abandoned before a terminal nickel arrived")]
    Abandoned,
}

impl SendError {
    /// The ERROR Nickel, if the responder sent one.
    pub fn error_nickel(&self) -> Option<&Nickel> {
        match self {
            SendError::ErrorNickel(nickel) => Some(nickel),
            SendError::Abandoned => None,
        }
    }
}
