//! Brass Runtime: configuration, logging and process bootstrap.
//!
//! This crate provides:
//! - Layered configuration (`config`): defaults, `brass.toml` / `brass.yaml`,
//!   `BRASS_*` environment variables
//! - Logging setup (`logging`) on `tracing-subscriber`
//! - [`BrassRuntime`], which turns a configuration into a driver plus an
//!   engine and runs it until shutdown
//!
//! ```ignore
//! use brass_runtime::BrassRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut runtime = BrassRuntime::builder().build().await?;
//!     runtime.on_event::<PrivateMessage>().handle(handler(echo), []);
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! The `driver` section picks the transport:
//!
//! ```toml
//! [driver]
//! type = "ws-server"   # or "http", "ws-client"
//! port = 6700
//! access_token = "secret"
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{BrassConfig, ConfigError, ConfigLoader, ConfigResult, DriverConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::{BrassRuntime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for handler code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
