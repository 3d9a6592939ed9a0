use nickel_types::NickelType;
use thiserror::Error;

/// Router errors.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Functions on RESPONSE or ERROR would republish into themselves.
    #[error("functions cannot be registered for terminal type {0}")]
    TerminalFunction(NickelType),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}
