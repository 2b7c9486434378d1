//! Error types for the Brass framework.

use thiserror::Error;

/// Returned to a conversation waiting for its next message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The engine is shutting down.
    #[error("conversation cancelled")]
    Cancelled,

    /// No matching message arrived in time.
    #[error("conversation timed out")]
    Timeout,

    /// The session slot was closed.
    #[error("conversation closed")]
    Closed,
}

/// Result type for conversation waits.
pub type SessionResult<T> = Result<T, SessionError>;
