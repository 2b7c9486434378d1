//! Layered configuration loading.
//!
//! Later layers win: built-in defaults, [`ConfigLoader::merge`] layers, the
//! profile file (`brass.<profile>.toml`), the main file (`brass.toml`), then
//! `BRASS_*` environment variables with `__` between nesting levels
//! (`BRASS_DRIVER__ACCESS_TOKEN` sets `driver.access_token`).
//!
//! YAML names are also searched with the `yaml-config` feature.
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .file("./deploy/brass.toml")
//!     .profile("production")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::BrassConfig;

const ENV_PREFIX: &str = "BRASS_";

/// File names tried in every search directory, in order.
const BASE_NAMES: &[&str] = &[
    #[cfg(feature = "toml-config")]
    "brass.toml",
    #[cfg(feature = "yaml-config")]
    "brass.yaml",
    #[cfg(feature = "yaml-config")]
    "brass.yml",
    #[cfg(feature = "toml-config")]
    "config.toml",
    #[cfg(feature = "yaml-config")]
    "config.yaml",
];

/// Selects the profile file merged under the main file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// `BRASS_PROFILE`, or development.
    pub fn from_env() -> Self {
        std::env::var("BRASS_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builder for one [`BrassConfig`] load.
pub struct ConfigLoader {
    layers: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    env: bool,
    file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            layers: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            env: true,
            file: None,
        }
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::parse(&profile.into());
        self
    }

    /// Adds a directory to search. With none added, the current directory
    /// and `<user config dir>/brass` are searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file; no search, no profile file.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Skips the `BRASS_*` environment layer.
    pub fn without_env(mut self) -> Self {
        self.env = false;
        self
    }

    /// Adds a layer above the built-in defaults.
    pub fn merge(mut self, config: BrassConfig) -> Self {
        self.layers = self.layers.merge(Serialized::defaults(config));
        self
    }

    /// Extracts the configuration. Validation is left to the caller.
    pub fn load(self) -> ConfigResult<BrassConfig> {
        let mut figment = Figment::from(Serialized::defaults(BrassConfig::default()))
            .merge(self.layers.clone());

        figment = match &self.file {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileNotFound(path.clone()));
                }
                info!(path = %path.display(), "Loading configuration file");
                merge_file(figment, path)?
            }
            None => self.search(figment)?,
        };

        if self.env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        let config: BrassConfig = figment.extract()?;
        debug!(
            profile = %self.profile,
            logging_level = %config.logging.level,
            driver = ?config.driver.as_ref().map(|d| d.kind()),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Merges the first main file found, preceded by its profile variant.
    fn search(&self, mut figment: Figment) -> ConfigResult<Figment> {
        let search_dirs: Vec<PathBuf> = if self.search_paths.is_empty() {
            std::env::current_dir()
                .ok()
                .into_iter()
                .chain(dirs::config_dir().map(|dir| dir.join("brass")))
                .collect()
        } else {
            self.search_paths.clone()
        };

        for dir in &search_dirs {
            for name in BASE_NAMES {
                let base = dir.join(name);
                if !base.exists() {
                    continue;
                }
                if let Some((stem, ext)) = name.rsplit_once('.') {
                    let variant = dir.join(format!("{stem}.{}.{ext}", self.profile));
                    if variant.exists() {
                        debug!(path = %variant.display(), "Loading profile configuration");
                        figment = merge_file(figment, &variant)?;
                    }
                }
                info!(path = %base.display(), "Loading configuration file");
                return merge_file(figment, &base);
            }
        }

        warn!(paths = ?search_dirs, "No configuration file found, using defaults");
        Ok(figment)
    }
}

/// Merges `path` with the provider its extension names.
fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;
    use crate::config::schema::{DriverConfig, LogFormat};

    #[test]
    fn test_default_config() {
        Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .unwrap();
            assert_eq!(config.logging.level, "info");
            assert!(config.driver.is_none());
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "brass.toml",
                r#"
                [engine]
                workers = 2

                [logging]
                level = "debug"
                format = "pretty"

                [driver]
                type = "ws-server"
                port = 6700
                access_token = "from-file"
                "#,
            )?;
            jail.set_env("BRASS_DRIVER__ACCESS_TOKEN", "from-env");
            jail.set_env("BRASS_ENGINE__QUEUE_CAPACITY", "64");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .unwrap();
            assert_eq!(config.engine.workers, Some(2));
            assert_eq!(config.engine.queue_capacity, 64);
            assert_eq!(config.logging.format, LogFormat::Pretty);
            match config.driver {
                Some(DriverConfig::WsServer(server)) => {
                    assert_eq!(server.port, 6700);
                    assert_eq!(server.path, "/ws");
                    assert_eq!(server.access_token.as_deref(), Some("from-env"));
                }
                other => panic!("unexpected driver {other:?}"),
            }
            Ok(())
        });
    }

    #[test]
    fn test_profile_file_is_overridden_by_base() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "brass.production.toml",
                "[logging]\nlevel = \"warn\"\nthread_ids = true",
            )?;
            jail.create_file("brass.toml", "[logging]\nlevel = \"error\"")?;

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .profile("prod")
                .without_env()
                .load()
                .unwrap();
            assert_eq!(config.logging.level, "error");
            assert!(config.logging.thread_ids);
            Ok(())
        });
    }

    #[test]
    fn test_earlier_directory_wins() {
        Jail::expect_with(|jail| {
            for dir in ["first", "second"] {
                std::fs::create_dir_all(jail.directory().join(dir)).unwrap();
            }
            jail.create_file("first/config.toml", "[logging]\nlevel = \"warn\"")?;
            jail.create_file("second/brass.toml", "[logging]\nlevel = \"error\"")?;
            // Later directories are not consulted once a main file is found.
            jail.create_file("second/brass.development.toml", "[engine]\nworkers = 9")?;

            let config = ConfigLoader::new()
                .search_path(jail.directory().join("first"))
                .search_path(jail.directory().join("second"))
                .profile("dev")
                .without_env()
                .load()
                .unwrap();
            assert_eq!(config.logging.level, "warn");
            assert_eq!(config.engine.workers, None);
            Ok(())
        });
    }

    #[test]
    fn test_explicit_file_errors() {
        assert!(matches!(
            ConfigLoader::new().file("does/not/exist.toml").load(),
            Err(ConfigError::FileNotFound(_))
        ));
        Jail::expect_with(|jail| {
            jail.create_file("brass.ini", "level = info")?;
            assert!(matches!(
                ConfigLoader::new().file("brass.ini").load(),
                Err(ConfigError::UnsupportedFormat(ext)) if ext == "ini"
            ));
            Ok(())
        });
    }

    #[test]
    fn test_profile_names() {
        assert_eq!(Profile::parse("PROD"), Profile::Production);
        assert_eq!(Profile::parse("dev"), Profile::Development);
        assert_eq!(Profile::parse("staging").to_string(), "staging");
    }
}
