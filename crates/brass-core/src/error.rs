//! Unified error types for the Brass core.
//!
//! Every layer gets its own enum so callers can tell a bad frame from a lost
//! connection from a failed action without string matching. Session errors
//! live in `brass-framework` next to the session store.

use thiserror::Error;

// =============================================================================
// Decode Errors
// =============================================================================

/// Errors produced while turning a wire frame into an [`Event`](crate::Event)
/// or a typed payload.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The frame is not valid JSON, or not a JSON object.
    #[error("invalid frame: {0}")]
    InvalidJson(String),

    /// A discriminator or header field is absent or has the wrong type.
    #[error("missing or invalid field `{0}`")]
    MissingField(String),

    /// The frame does not match the shape of the requested payload type.
    #[error("payload does not match `{event_type}`: {reason}")]
    Payload {
        /// Type key the payload was decoded as.
        event_type: String,
        /// Serde error message.
        reason: String,
    },
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur in transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Binding a listening socket failed.
    #[error("failed to bind {addr}: {reason}")]
    BindFailed {
        /// Address that could not be bound.
        addr: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connection failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connection closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// Message send failed.
    #[error("failed to send frame: {0}")]
    SendFailed(String),

    /// Invalid configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// API Errors
// =============================================================================

/// Error type for outbound actions.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The gateway answered with a non-200 HTTP status.
    #[error("action `{action}` returned HTTP {status}: {body}")]
    HttpStatus {
        /// Action name.
        action: String,
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The response envelope reported a failure.
    #[error("action `{action}` failed ({retcode}): {body}")]
    Failed {
        /// Action name.
        action: String,
        /// Return code from the envelope.
        retcode: i64,
        /// Raw response body.
        body: String,
    },

    /// No response arrived within the action timeout.
    #[error("action `{action}` timed out")]
    Timeout {
        /// Action name.
        action: String,
    },

    /// The caller's cancellation token fired before a response arrived.
    #[error("action `{action}` cancelled")]
    Cancelled {
        /// Action name.
        action: String,
    },

    /// The socket bound to the identity is gone.
    #[error("bot is not connected")]
    NotConnected,

    /// No emitter is registered for the identity.
    #[error("no emitter registered for self_id {0}")]
    UnknownIdentity(i64),

    /// Failed to serialize/deserialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Reply Errors
// =============================================================================

/// Errors returned by quick replies.
#[derive(Debug, Clone, Error)]
pub enum ReplyError {
    /// The event was not delivered with a replyer.
    #[error("no replyer available for this event")]
    NoReplyer,

    /// The reply window closed before the reply was made.
    #[error("reply window has expired")]
    Expired,

    /// The event was already answered.
    #[error("event has already been replied to")]
    AlreadyReplied,

    /// The reply could not be delivered to the gateway.
    #[error("reply delivery failed: {0}")]
    Delivery(String),
}

impl From<ApiError> for ReplyError {
    fn from(err: ApiError) -> Self {
        Self::Delivery(err.to_string())
    }
}

impl From<serde_json::Error> for ReplyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Delivery(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for frame decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for outbound actions.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type for quick replies.
pub type ReplyResult<T> = Result<T, ReplyError>;
