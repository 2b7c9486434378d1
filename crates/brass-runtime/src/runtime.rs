//! Process bootstrap: configuration in, running engine out.
//!
//! ```rust,ignore
//! use brass_runtime::BrassRuntime;
//!
//! let mut runtime = BrassRuntime::builder()
//!     .config_file("brass.toml")
//!     .build()
//!     .await?;
//! runtime
//!     .on_event::<PrivateMessage>()
//!     .handle(handler(echo), []);
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, error, info};

use brass_core::{Driver, EmitterMux, Payload};
use brass_framework::{Composer, Engine};
use brass_transport::http::HttpDriver;
use brass_transport::ws::{WsClient, WsServer};

use crate::config::{BrassConfig, ConfigError, ConfigLoader, DriverConfig, validate_config};
use crate::error::RuntimeResult;
use crate::logging;

/// A configured engine plus the driver feeding it.
pub struct BrassRuntime {
    config: BrassConfig,
    engine: Engine,
    emitters: Arc<dyn EmitterMux>,
}

impl BrassRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Validates `config`, sets up logging and builds the driver.
    ///
    /// # Errors
    /// Invalid configuration, an unopenable log file, or an HTTP emitter
    /// whose identity cannot be discovered.
    pub async fn from_config(config: BrassConfig) -> RuntimeResult<Self> {
        validate_config(&config)?;
        let dispatch = logging::init_from_config(&config.logging)?;

        let driver_config = config
            .driver
            .as_ref()
            .ok_or_else(|| ConfigError::missing_field("driver"))?;
        let driver = build_driver(driver_config)
            .with_subscriber(dispatch.clone())
            .await?;

        let mut engine = Engine::new(driver.clone())
            .with_queue_capacity(config.engine.queue_capacity)
            .with_dispatch(dispatch.clone());
        if let Some(workers) = config.engine.workers {
            engine = engine.with_workers(workers);
        }

        tracing::dispatcher::with_default(&dispatch, || {
            info!(
                driver = %driver_config.kind(),
                log_level = %config.logging.level,
                "Runtime initialized from configuration"
            );
        });

        Ok(Self {
            config,
            engine,
            emitters: driver.emitters(),
        })
    }

    pub fn config(&self) -> &BrassConfig {
        &self.config
    }

    /// Live emitters by bot identity, for sending outside of a handler.
    pub fn emitters(&self) -> Arc<dyn EmitterMux> {
        self.emitters.clone()
    }

    /// See [`Engine::on_event`].
    pub fn on_event<T: Payload>(&mut self) -> Composer<T> {
        self.engine.on_event::<T>()
    }

    /// See [`Engine::on_selfs_event`].
    pub fn on_selfs_event<T: Payload>(
        &mut self,
        selfs: impl IntoIterator<Item = i64>,
    ) -> Composer<T> {
        self.engine.on_selfs_event::<T>(selfs)
    }

    /// Runs until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    /// The driver failing, or the signal handlers failing to install.
    pub async fn run(self) -> RuntimeResult<()> {
        info!("Brass runtime is now running. Press Ctrl+C to stop.");
        self.drive(wait_for_shutdown()).await
    }

    /// Runs until `shutdown` completes.
    ///
    /// # Errors
    /// The driver failing to start or dying.
    pub async fn run_until<F>(self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.drive(async {
            shutdown.await;
            Ok(())
        })
        .await
    }

    async fn drive<F>(self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = RuntimeResult<()>>,
    {
        let token = CancellationToken::new();
        let engine = self.engine.run(token.clone());
        tokio::pin!(engine);

        tokio::select! {
            result = &mut engine => {
                result?;
                Ok(())
            }
            signalled = shutdown => {
                token.cancel();
                let stopped = engine.await;
                signalled?;
                stopped?;
                info!("Runtime stopped");
                Ok(())
            }
        }
    }
}

async fn build_driver(config: &DriverConfig) -> RuntimeResult<Arc<dyn Driver>> {
    let driver: Arc<dyn Driver> = match config {
        DriverConfig::Http(http) => {
            Arc::new(HttpDriver::connect(http.listener(), http.emitters()).await?)
        }
        DriverConfig::WsServer(server) => Arc::new(WsServer::new(server.to_transport())),
        DriverConfig::WsClient(client) => Arc::new(WsClient::new(client.to_transport())),
    };
    Ok(driver)
}

/// Waits for Ctrl+C, or SIGTERM on Unix.
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Loads configuration, then builds a [`BrassRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    dispatch: Option<Dispatch>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            dispatch: None,
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges a programmatic layer under files and environment.
    pub fn merge(mut self, config: BrassConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Logs loading itself to `dispatch`; until logging is configured
    /// loader messages are otherwise dropped.
    pub fn loader_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// # Errors
    /// See [`ConfigLoader::load`] and [`BrassRuntime::from_config`].
    pub async fn build(self) -> RuntimeResult<BrassRuntime> {
        let loader = self.config_loader;
        let config = match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, || loader.load()),
            None => loader.load(),
        }
        .inspect_err(|e| error!(error = %e, "Failed to load configuration"))?;
        BrassRuntime::from_config(config).await
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;

    use brass_core::payload::PrivateMessage;
    use brass_framework::{Context, handler};

    use super::*;
    use crate::config::{
        ConfigError, HttpDriverConfig, HttpEmitterEntry, WsClientDriverConfig, WsNodeEntry,
    };
    use crate::error::RuntimeError;

    async fn free_addr() -> String {
        let scratch = TcpListener::bind("127.0.0.1:0").await.unwrap();
        scratch.local_addr().unwrap().to_string()
    }

    #[tokio::test]
    async fn missing_driver_is_rejected() {
        let result = BrassRuntime::from_config(BrassConfig::default()).await;
        assert!(matches!(
            result,
            Err(RuntimeError::Config(ConfigError::MissingField { .. }))
        ));
    }

    #[tokio::test]
    async fn unreachable_http_emitter_is_fatal() {
        let config = BrassConfig {
            driver: Some(DriverConfig::Http(HttpDriverConfig {
                host: "127.0.0.1".into(),
                port: 5701,
                path: "/".into(),
                secret: None,
                reply_timeout_ms: 1000,
                shutdown_grace_ms: 1000,
                emitters: vec![HttpEmitterEntry {
                    url: format!("http://{}", free_addr().await),
                    access_token: None,
                    self_id: None,
                    timeout_ms: 1000,
                }],
            })),
            ..Default::default()
        };
        let result = BrassRuntime::from_config(config).await;
        assert!(matches!(result, Err(RuntimeError::Api(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_until_stops_cleanly() {
        let config = BrassConfig {
            driver: Some(DriverConfig::WsClient(WsClientDriverConfig {
                nodes: vec![WsNodeEntry {
                    url: free_addr().await,
                    access_token: None,
                }],
                retry_interval_ms: 50,
                action_timeout_ms: 1000,
            })),
            ..Default::default()
        };
        let mut runtime = BrassRuntime::from_config(config).await.unwrap();
        runtime
            .on_event::<PrivateMessage>()
            .handle(
                handler(|_ctx: &mut Context<PrivateMessage>| Box::pin(async {})),
                [],
            );
        assert!(runtime.emitters().self_ids().is_empty());

        tokio::time::timeout(
            Duration::from_secs(5),
            runtime.run_until(tokio::time::sleep(Duration::from_millis(200))),
        )
        .await
        .unwrap()
        .unwrap();
    }
}
