//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    BrassConfig, DriverConfig, EngineConfig, HttpDriverConfig, LogFormat, LogOutput,
    LoggingConfig, WsClientDriverConfig, WsServerDriverConfig,
};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validates the entire configuration.
///
/// A missing `driver` section is an error: there is nothing to run.
pub fn validate_config(config: &BrassConfig) -> ConfigResult<()> {
    validate_engine_config(&config.engine)?;
    validate_logging_config(&config.logging)?;
    match &config.driver {
        Some(driver) => validate_driver_config(driver),
        None => Err(ConfigError::missing_field("driver")),
    }
}

fn validate_engine_config(engine: &EngineConfig) -> ConfigResult<()> {
    if engine.workers == Some(0) {
        return Err(ConfigError::validation("engine.workers must be greater than 0"));
    }
    if engine.queue_capacity == 0 {
        return Err(ConfigError::validation(
            "engine.queue_capacity must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    validate_log_level(&logging.level)?;
    for (target, level) in &logging.filters {
        if target.is_empty() {
            return Err(ConfigError::validation("Log filter target cannot be empty"));
        }
        validate_log_level(level)?;
    }

    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    if logging.format == LogFormat::Json && !cfg!(feature = "json-log") {
        return Err(ConfigError::validation(
            "JSON log format requires the `json-log` feature",
        ));
    }
    Ok(())
}

fn validate_log_level(level: &str) -> ConfigResult<()> {
    if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
        return Err(ConfigError::validation(format!(
            "Invalid log level: {level}. Valid values are: {LOG_LEVELS:?}"
        )));
    }
    Ok(())
}

fn validate_driver_config(driver: &DriverConfig) -> ConfigResult<()> {
    match driver {
        DriverConfig::Http(http) => validate_http(http),
        DriverConfig::WsServer(server) => validate_ws_server(server),
        DriverConfig::WsClient(client) => validate_ws_client(client),
    }
}

fn validate_http(http: &HttpDriverConfig) -> ConfigResult<()> {
    validate_port(http.port)?;
    validate_path(&http.path)?;
    validate_timeout("driver.reply_timeout_ms", http.reply_timeout_ms)?;
    for emitter in &http.emitters {
        validate_url(&emitter.url, &["http://", "https://"])?;
        validate_timeout("driver.emitters.timeout_ms", emitter.timeout_ms)?;
    }
    Ok(())
}

fn validate_ws_server(server: &WsServerDriverConfig) -> ConfigResult<()> {
    validate_port(server.port)?;
    validate_path(&server.path)?;
    validate_timeout("driver.action_timeout_ms", server.action_timeout_ms)
}

fn validate_ws_client(client: &WsClientDriverConfig) -> ConfigResult<()> {
    if client.nodes.is_empty() {
        return Err(ConfigError::missing_field("driver.nodes"));
    }
    for node in &client.nodes {
        // Bare `host:port` is dialled as ws://.
        if node.url.contains("://") {
            validate_url(&node.url, &["ws://", "wss://"])?;
        } else if node.url.is_empty() {
            return Err(ConfigError::missing_field("driver.nodes.url"));
        }
    }
    validate_timeout("driver.retry_interval_ms", client.retry_interval_ms)?;
    validate_timeout("driver.action_timeout_ms", client.action_timeout_ms)
}

fn validate_url(url: &str, schemes: &[&str]) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::missing_field("url"));
    }
    if !schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {schemes:?}"),
        ));
    }
    Ok(())
}

fn validate_port(port: u16) -> ConfigResult<()> {
    if port == 0 {
        return Err(ConfigError::InvalidPort(port));
    }
    Ok(())
}

fn validate_path(path: &str) -> ConfigResult<()> {
    if !path.starts_with('/') {
        return Err(ConfigError::validation("Path must start with '/'"));
    }
    Ok(())
}

fn validate_timeout(field: &str, millis: u64) -> ConfigResult<()> {
    if millis == 0 {
        return Err(ConfigError::validation(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{HttpEmitterEntry, WsNodeEntry};

    fn ws_client(urls: &[&str]) -> BrassConfig {
        BrassConfig {
            driver: Some(DriverConfig::WsClient(WsClientDriverConfig {
                nodes: urls
                    .iter()
                    .map(|url| WsNodeEntry {
                        url: url.to_string(),
                        access_token: None,
                    })
                    .collect(),
                retry_interval_ms: 3000,
                action_timeout_ms: 5000,
            })),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_minimal_config() {
        assert!(validate_config(&ws_client(&["127.0.0.1:3001"])).is_ok());
        assert!(validate_config(&ws_client(&["wss://gw.example/ws"])).is_ok());
    }

    #[test]
    fn test_validate_missing_driver() {
        let result = validate_config(&BrassConfig::default());
        assert!(matches!(result, Err(ConfigError::MissingField { field }) if field == "driver"));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = ws_client(&["127.0.0.1:3001"]);
        config.logging.level = "loud".to_string();
        assert!(validate_config(&config).is_err());

        config.logging.level = "DEBUG".to_string();
        config
            .logging
            .filters
            .insert("brass_transport".into(), "verbose".into());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_engine_limits() {
        let mut config = ws_client(&["127.0.0.1:3001"]);
        config.engine.workers = Some(0);
        assert!(validate_config(&config).is_err());

        config.engine.workers = Some(2);
        config.engine.queue_capacity = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_ws_client_nodes() {
        assert!(matches!(
            validate_config(&ws_client(&[])),
            Err(ConfigError::MissingField { .. })
        ));
        assert!(matches!(
            validate_config(&ws_client(&["http://127.0.0.1:3001"])),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_validate_http_driver() {
        let mut http = HttpDriverConfig {
            host: "127.0.0.1".into(),
            port: 5701,
            path: "/".into(),
            secret: None,
            reply_timeout_ms: 1000,
            shutdown_grace_ms: 5000,
            emitters: vec![HttpEmitterEntry {
                url: "http://127.0.0.1:5700".into(),
                access_token: None,
                self_id: None,
                timeout_ms: 30000,
            }],
        };
        let config = |http: &HttpDriverConfig| BrassConfig {
            driver: Some(DriverConfig::Http(http.clone())),
            ..Default::default()
        };
        assert!(validate_config(&config(&http)).is_ok());

        http.port = 0;
        assert!(matches!(
            validate_config(&config(&http)),
            Err(ConfigError::InvalidPort(0))
        ));

        http.port = 5701;
        http.emitters[0].url = "127.0.0.1:5700".into();
        assert!(matches!(
            validate_config(&config(&http)),
            Err(ConfigError::InvalidUrl { .. })
        ));

        http.emitters[0].url = "http://127.0.0.1:5700".into();
        http.reply_timeout_ms = 0;
        assert!(validate_config(&config(&http)).is_err());
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = ws_client(&["127.0.0.1:3001"]);
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());
        config.logging.file_path = Some("brass.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
