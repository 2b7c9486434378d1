//! Runtime error types.

use thiserror::Error;

use brass_core::{ApiError, TransportError};

use crate::config::ConfigError;

/// Errors that stop a runtime from starting or running.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The log sink could not be set up.
    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    /// A driver could not be built, e.g. identity discovery failed.
    #[error("Failed to start driver: {0}")]
    Api(#[from] ApiError),

    /// The driver stopped with an error.
    #[error("Driver failed: {0}")]
    Transport(#[from] TransportError),

    /// Installing the shutdown signal handler failed.
    #[error("Failed to listen for shutdown signals: {0}")]
    Signal(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
