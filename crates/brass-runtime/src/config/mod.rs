//! Configuration for a Brass process.
//!
//! Layered loading (defaults, files, `BRASS_*` environment) in [`loader`],
//! the schema in [`schema`], and semantic checks in [`validation`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    BrassConfig, DriverConfig, DriverKind, EngineConfig, HttpDriverConfig, HttpEmitterEntry,
    LogFormat, LogOutput, LogRotation, LoggingConfig, WsClientDriverConfig, WsNodeEntry,
    WsServerDriverConfig,
};
pub use validation::validate_config;
