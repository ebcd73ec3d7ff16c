use std::time::Duration;
use thiserror::Error;

/// Error taxonomy for the OLT management core.
///
/// Every variant carries a human-readable message; `kind()` returns the
/// stable machine-checkable tag the API layer serializes. Transport and
/// command failures are distinct from validation/lookup failures so the
/// batch engine can decide what degrades a sub-operation versus what is
/// returned straight to the caller.
#[derive(Debug, Error)]
pub enum OltError {
    /// Malformed input, rejected before any I/O.
    #[error("validation error: {0}")]
    Validation(String),

    /// Transient transport-level failure; the session will retry.
    #[error("connection error: {0}")]
    Connection(String),

    /// Connection failed after the retry cap was exhausted.
    #[error("connection failed after {retries} attempts: {message}")]
    ConnectionFatal { retries: u32, message: String },

    /// A command failed on a connected channel.
    #[error("command failed: {0}")]
    Command(String),

    /// A command did not complete within the configured timeout.
    #[error("command timed out after {0:?}")]
    CommandTimeout(Duration),

    /// Unknown batch id, serial, or other missing entity.
    #[error("{0} not found")]
    NotFound(String),

    /// Action not permitted in the entity's current state.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl OltError {
    /// Stable machine-checkable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            OltError::Validation(_) => "validation",
            OltError::Connection(_) => "connection",
            OltError::ConnectionFatal { .. } => "connection_fatal",
            OltError::Command(_) => "command",
            OltError::CommandTimeout(_) => "command_timeout",
            OltError::NotFound(_) => "not_found",
            OltError::Conflict(_) => "conflict",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        OltError::Validation(msg.into())
    }

    pub fn not_found(entity: impl Into<String>) -> Self {
        OltError::NotFound(entity.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        OltError::Conflict(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, OltError>;
