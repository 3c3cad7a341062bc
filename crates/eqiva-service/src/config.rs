//! Service configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener.
    pub server: ServerConfig,
    /// Background status polling.
    pub poller: PollerConfig,
    /// Where the latest statuses are kept.
    pub storage: StorageConfig,
    /// Bluetooth timeouts.
    pub bluetooth: BluetoothConfig,
}

impl Config {
    /// Load the default config file, or defaults when there is none.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Check every section and report all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.server.bind.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: format!("invalid bind address '{}': expected host:port", self.server.bind),
            });
        }
        if self.poller.interval == 0 {
            errors.push(ValidationError {
                field: "poller.interval".to_string(),
                message: "interval must be at least 1 second".to_string(),
            });
        }
        if self.storage.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "path cannot be empty".to_string(),
            });
        }
        if let Some(secs) = self.bluetooth.response_timeout
            && !(secs.is_finite() && secs > 0.0)
        {
            errors.push(ValidationError {
                field: "bluetooth.response_timeout".to_string(),
                message: format!("{} is not a positive number of seconds", secs),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:5001").
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5001".to_string(),
        }
    }
}

/// Background poller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub enabled: bool,
    /// Seconds between two rounds over all known thermostats.
    pub interval: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 30,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval.max(1))
    }
}

/// Status store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding the latest status per thermostat.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Bluetooth timeouts; unset values keep the library defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Scan and connect timeout in seconds.
    pub timeout: Option<u64>,
    /// Seconds to wait for each command's reply.
    pub response_timeout: Option<f64>,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind`).
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("eqiva")
        .join("service.toml")
}

/// Default status store path.
pub fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("eqiva")
        .join("status_store.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.bind, "0.0.0.0:5001");
        assert!(config.poller.enabled);
        assert_eq!(config.poller.interval(), Duration::from_secs(30));
        assert!(config.storage.path.ends_with("status_store.json"));
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let toml = r#"
            [poller]
            interval = 60

            [bluetooth]
            response_timeout = 2.5
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.poller.interval, 60);
        assert!(config.poller.enabled);
        assert_eq!(config.server.bind, "0.0.0.0:5001");
        assert_eq!(config.bluetooth.response_timeout, Some(2.5));
        assert_eq!(config.bluetooth.timeout, None);
    }

    #[test]
    fn test_validation_reports_every_problem() {
        let mut config = Config::default();
        config.server.bind = "localhost".to_string();
        config.poller.interval = 0;
        config.bluetooth.response_timeout = Some(-1.0);

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation errors");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["server.bind", "poller.interval", "bluetooth.response_timeout"]
        );
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("service.toml");

        let mut config = Config::default();
        config.server.bind = "127.0.0.1:9090".to_string();
        config.storage.path = PathBuf::from("/tmp/status.json");
        config.bluetooth.timeout = Some(20);
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.server.bind, "127.0.0.1:9090");
        assert_eq!(loaded.storage.path, PathBuf::from("/tmp/status.json"));
        assert_eq!(loaded.bluetooth.timeout, Some(20));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("service.toml");
        std::fs::write(&path, "[server\nbind = ").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }
}
