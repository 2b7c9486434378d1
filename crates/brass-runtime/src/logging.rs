//! Logging setup on `tracing-subscriber`.
//!
//! The library crates only emit `tracing` events; nothing is printed until a
//! subscriber exists. This module builds one from [`LoggingConfig`] and hands
//! back the [`Dispatch`], so the runtime can both install it globally and
//! pass it to the engine explicitly.
//!
//! ```rust,ignore
//! use brass_runtime::logging::LoggingBuilder;
//!
//! LoggingBuilder::new()
//!     .with_level(tracing::Level::DEBUG)
//!     .directive("brass_transport=trace")
//!     .init();
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{Dispatch, Level};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, LogOutput, LogRotation, LoggingConfig};
use crate::error::{RuntimeError, RuntimeResult};

/// Builds the dispatch from configuration and installs it as the global
/// default when none is set yet.
///
/// The dispatch is returned either way so it can still be injected into the
/// engine.
///
/// # Errors
/// Fails only when the log file cannot be opened.
pub fn init_from_config(config: &LoggingConfig) -> RuntimeResult<Dispatch> {
    let dispatch = LoggingBuilder::from_config(config).build()?;
    // Already set by the embedding application; theirs wins.
    let _ = tracing::dispatcher::set_global_default(dispatch.clone());
    Ok(dispatch)
}

/// A builder for configuring logging.
pub struct LoggingBuilder {
    directives: Vec<String>,
    level: Option<Level>,
    format: LogFormat,
    output: LogOutput,
    with_target: bool,
    with_thread_ids: bool,
    with_file: bool,
    with_line_number: bool,
    file_path: Option<PathBuf>,
    rotation: LogRotation,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self {
            directives: Vec::new(),
            level: None,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            with_target: true,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
            file_path: None,
            rotation: LogRotation::Never,
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut builder = Self::new();
        builder.level = parse_level(&config.level);
        builder.format = config.format;
        builder.output = config.output;
        builder.with_thread_ids = config.thread_ids;
        builder.with_file = config.file_location;
        builder.with_line_number = config.file_location;
        builder.file_path.clone_from(&config.file_path);
        builder.rotation = config.rotation;
        for (target, level) in &config.filters {
            builder
                .directives
                .push(format!("{target}={}", level.to_lowercase()));
        }
        builder
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    /// Adds an `EnvFilter` directive such as `brass_transport=debug`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.with_thread_ids = enabled;
        self
    }

    pub fn with_file(mut self, enabled: bool) -> Self {
        self.with_file = enabled;
        self
    }

    pub fn with_line_number(mut self, enabled: bool) -> Self {
        self.with_line_number = enabled;
        self
    }

    /// Writes to `path` when output is [`LogOutput::File`].
    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// `RUST_LOG` if set, else the base level; explicit directives on top.
    fn build_filter(&self) -> EnvFilter {
        let base = self.level.unwrap_or(Level::INFO).to_string().to_lowercase();
        let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&base));
        for directive in &self.directives {
            if let Ok(d) = directive.parse() {
                filter = filter.add_directive(d);
            }
        }
        filter
    }

    fn file_appender(&self, path: &Path) -> RuntimeResult<RollingFileAppender> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path.file_name().unwrap_or_else(|| OsStr::new("brass.log"));
        let rotation = match self.rotation {
            LogRotation::Never => Rotation::NEVER,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
        };
        RollingFileAppender::builder()
            .rotation(rotation)
            .filename_prefix(name.to_string_lossy())
            .build(dir)
            .map_err(|e| RuntimeError::Logging(format!("{}: {e}", path.display())))
    }

    /// Builds the subscriber without installing it.
    ///
    /// # Errors
    /// Fails when the log file cannot be opened.
    pub fn build(self) -> RuntimeResult<Dispatch> {
        let filter = self.build_filter();

        macro_rules! configure_layer {
            ($layer:expr) => {
                $layer
                    .with_target(self.with_target)
                    .with_thread_ids(self.with_thread_ids)
                    .with_file(self.with_file)
                    .with_line_number(self.with_line_number)
            };
        }

        macro_rules! dispatch_with_writer {
            ($writer:expr, $ansi:expr) => {
                match self.format {
                    #[cfg(feature = "json-log")]
                    LogFormat::Json => {
                        let layer = fmt::layer().json().with_writer($writer);
                        Dispatch::new(tracing_subscriber::registry().with(layer).with(filter))
                    }
                    #[cfg(not(feature = "json-log"))]
                    LogFormat::Json | LogFormat::Full => {
                        let layer = configure_layer!(fmt::layer().with_ansi($ansi).with_writer($writer));
                        Dispatch::new(tracing_subscriber::registry().with(layer).with(filter))
                    }
                    #[cfg(feature = "json-log")]
                    LogFormat::Full => {
                        let layer = configure_layer!(fmt::layer().with_ansi($ansi).with_writer($writer));
                        Dispatch::new(tracing_subscriber::registry().with(layer).with(filter))
                    }
                    LogFormat::Compact => {
                        let layer = configure_layer!(
                            fmt::layer().compact().with_ansi($ansi).with_writer($writer)
                        );
                        Dispatch::new(tracing_subscriber::registry().with(layer).with(filter))
                    }
                    LogFormat::Pretty => {
                        let layer = configure_layer!(
                            fmt::layer().pretty().with_ansi($ansi).with_writer($writer)
                        );
                        Dispatch::new(tracing_subscriber::registry().with(layer).with(filter))
                    }
                }
            };
        }

        let dispatch = match self.output {
            LogOutput::Stdout => dispatch_with_writer!(std::io::stdout, true),
            LogOutput::Stderr => dispatch_with_writer!(std::io::stderr, true),
            LogOutput::File => match &self.file_path {
                Some(path) => {
                    let appender = self.file_appender(path)?;
                    dispatch_with_writer!(appender, false)
                }
                None => {
                    return Err(RuntimeError::Logging(
                        "file output requested without a file path".to_string(),
                    ));
                }
            },
        };
        Ok(dispatch)
    }

    /// Installs the subscriber globally.
    ///
    /// # Errors
    /// Fails when the log file cannot be opened or a global subscriber is
    /// already set.
    pub fn try_init(self) -> RuntimeResult<()> {
        let dispatch = self.build()?;
        tracing::dispatcher::set_global_default(dispatch)
            .map_err(|e| RuntimeError::Logging(e.to_string()))
    }

    /// Like [`try_init`](Self::try_init), ignoring failures.
    pub fn init(self) {
        let _ = self.try_init();
    }
}

fn parse_level(level: &str) -> Option<Level> {
    level.parse().ok()
}
