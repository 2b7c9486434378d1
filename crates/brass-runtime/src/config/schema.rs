//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use brass_framework::DEFAULT_QUEUE_CAPACITY;
use brass_transport::DEFAULT_SHUTDOWN_GRACE;
use brass_transport::http::{
    DEFAULT_REPLY_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, HttpEmitterConfig, HttpListenerConfig,
};
use brass_transport::ws::{
    DEFAULT_ACTION_TIMEOUT, DEFAULT_RETRY_INTERVAL, WsClientConfig, WsNode, WsServerConfig,
};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BrassConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Which transport carries events and actions. Required to run.
    ///
    /// Kept out of the serialized defaults so a file selecting one driver
    /// never inherits fields from another.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverConfig>,
}

// =============================================================================
// Engine
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker tasks draining the event queue; defaults to the CPU count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: None,
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

// =============================================================================
// Logging
// =============================================================================

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// File rotation period for [`LogOutput::File`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Per-target levels, e.g. `brass_transport = "debug"`.
    #[serde(default)]
    pub filters: BTreeMap<String, String>,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line number.
    #[serde(default)]
    pub file_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: None,
            rotation: LogRotation::default(),
            filters: BTreeMap::new(),
            thread_ids: false,
            file_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

// =============================================================================
// Drivers
// =============================================================================

/// Transport selection, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DriverConfig {
    /// Webhook listener plus HTTP action endpoints.
    Http(HttpDriverConfig),

    /// Gateways connect to us.
    WsServer(WsServerDriverConfig),

    /// We connect to gateways.
    WsClient(WsClientDriverConfig),
}

impl DriverConfig {
    pub fn kind(&self) -> DriverKind {
        match self {
            Self::Http(_) => DriverKind::Http,
            Self::WsServer(_) => DriverKind::WsServer,
            Self::WsClient(_) => DriverKind::WsClient,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Http,
    WsServer,
    WsClient,
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Http => "http",
            Self::WsServer => "ws-server",
            Self::WsClient => "ws-client",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpDriverConfig {
    #[serde(default = "default_host")]
    pub host: String,

    pub port: u16,

    #[serde(default = "default_http_path")]
    pub path: String,

    /// HMAC-SHA1 key for `X-Signature`; empty or absent disables the check.
    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,

    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Gateway HTTP APIs, one per bot identity.
    #[serde(default)]
    pub emitters: Vec<HttpEmitterEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpEmitterEntry {
    pub url: String,

    #[serde(default)]
    pub access_token: Option<String>,

    /// Discovered with `get_login_info` when absent.
    #[serde(default)]
    pub self_id: Option<i64>,

    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
}

impl HttpDriverConfig {
    pub fn listener(&self) -> HttpListenerConfig {
        HttpListenerConfig {
            host: self.host.clone(),
            port: self.port,
            path: self.path.clone(),
            secret: self.secret.clone(),
            reply_timeout: Duration::from_millis(self.reply_timeout_ms),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }

    pub fn emitters(&self) -> Vec<HttpEmitterConfig> {
        self.emitters
            .iter()
            .map(|entry| HttpEmitterConfig {
                url: entry.url.clone(),
                access_token: entry.access_token.clone(),
                self_id: entry.self_id,
                timeout: Duration::from_millis(entry.timeout_ms),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsServerDriverConfig {
    #[serde(default = "default_host")]
    pub host: String,

    pub port: u16,

    #[serde(default = "default_ws_path")]
    pub path: String,

    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,

    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl WsServerDriverConfig {
    pub fn to_transport(&self) -> WsServerConfig {
        WsServerConfig {
            host: self.host.clone(),
            port: self.port,
            path: self.path.clone(),
            access_token: self.access_token.clone(),
            action_timeout: Duration::from_millis(self.action_timeout_ms),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsClientDriverConfig {
    #[serde(default)]
    pub nodes: Vec<WsNodeEntry>,

    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsNodeEntry {
    /// `ws://`, `wss://` or a bare `host:port`.
    pub url: String,

    #[serde(default)]
    pub access_token: Option<String>,
}

impl WsClientDriverConfig {
    pub fn to_transport(&self) -> WsClientConfig {
        WsClientConfig {
            nodes: self
                .nodes
                .iter()
                .map(|node| WsNode {
                    url: node.url.clone(),
                    access_token: node.access_token.clone(),
                })
                .collect(),
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            action_timeout: Duration::from_millis(self.action_timeout_ms),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_path() -> String {
    "/".to_string()
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn default_reply_timeout_ms() -> u64 {
    millis(DEFAULT_REPLY_TIMEOUT)
}

fn default_request_timeout_ms() -> u64 {
    millis(DEFAULT_REQUEST_TIMEOUT)
}

fn default_action_timeout_ms() -> u64 {
    millis(DEFAULT_ACTION_TIMEOUT)
}

fn default_retry_interval_ms() -> u64 {
    millis(DEFAULT_RETRY_INTERVAL)
}

fn default_shutdown_grace_ms() -> u64 {
    millis(DEFAULT_SHUTDOWN_GRACE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_sections_fill_defaults() {
        let driver: DriverConfig = serde_json::from_value(serde_json::json!({
            "type": "ws-client",
            "nodes": [{"url": "127.0.0.1:3001"}],
        }))
        .unwrap();
        let DriverConfig::WsClient(client) = &driver else {
            panic!("wrong variant: {driver:?}");
        };
        let transport = client.to_transport();
        assert_eq!(transport.retry_interval, DEFAULT_RETRY_INTERVAL);
        assert_eq!(transport.action_timeout, DEFAULT_ACTION_TIMEOUT);
        assert_eq!(transport.nodes[0].url, "127.0.0.1:3001");
        assert_eq!(driver.kind().to_string(), "ws-client");
    }

    #[test]
    fn http_section_splits_into_listener_and_emitters() {
        let driver: DriverConfig = serde_json::from_value(serde_json::json!({
            "type": "http",
            "port": 5701,
            "secret": "s3cret",
            "emitters": [{"url": "http://127.0.0.1:5700", "self_id": 42}],
        }))
        .unwrap();
        let DriverConfig::Http(http) = driver else {
            panic!("wrong variant");
        };
        let listener = http.listener();
        assert_eq!(listener.path, "/");
        assert_eq!(listener.secret.as_deref(), Some("s3cret"));
        assert_eq!(listener.reply_timeout, DEFAULT_REPLY_TIMEOUT);

        let emitters = http.emitters();
        assert_eq!(emitters.len(), 1);
        assert_eq!(emitters[0].self_id, Some(42));
        assert_eq!(emitters[0].timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn default_config_has_no_driver() {
        let config = BrassConfig::default();
        assert!(config.driver.is_none());
        assert_eq!(config.engine.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.logging.level, "info");
    }
}
