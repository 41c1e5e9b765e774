//! Configuration for the serial monitor.
//!
//! TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of
//! priority):
//!
//! 1. `SERIAL_MONITOR_CONFIG` environment variable (explicit path)
//! 2. `./serial-monitor.toml` (current directory)
//! 3. platform config dir (`~/.config/serial-monitor/config.toml` on
//!    Linux/macOS, `%APPDATA%\serial-monitor\config.toml` on Windows)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! - `SERIAL_MONITOR_DEFAULT_BAUD=115200`
//! - `SERIAL_MONITOR_DISABLE_PROBE=1`
//! - `SERIAL_MONITOR_LOG=debug`

use crate::session::DEFAULT_BAUD_RATE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidOverride { key: &'static str, value: String },
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial port configuration
    pub serial: SerialSettings,
    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Serial port configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Baud rate used when the caller does not pick one.
    pub default_baud: u32,
    /// Skip the post-open liveness probe.
    pub disable_probe: bool,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            default_baud: DEFAULT_BAUD_RATE,
            disable_probe: false,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration with automatic path resolution and environment
    /// overrides applied on top.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match resolve_config_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(raw) = std::env::var("SERIAL_MONITOR_DEFAULT_BAUD") {
            self.serial.default_baud =
                raw.parse().map_err(|_| ConfigError::InvalidOverride {
                    key: "SERIAL_MONITOR_DEFAULT_BAUD",
                    value: raw.clone(),
                })?;
        }
        if let Ok(raw) = std::env::var("SERIAL_MONITOR_DISABLE_PROBE") {
            self.serial.disable_probe = matches!(raw.as_str(), "1" | "true" | "yes");
        }
        if let Ok(raw) = std::env::var("SERIAL_MONITOR_LOG") {
            self.logging.level = raw;
        }
        Ok(())
    }
}

/// Resolve the config file path, or `None` to use built-in defaults.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SERIAL_MONITOR_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let local = PathBuf::from("serial-monitor.toml");
    if local.exists() {
        return Some(local);
    }
    directories::ProjectDirs::from("", "", "serial-monitor")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .filter(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.default_baud, 9600);
        assert!(!config.serial.disable_probe);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[serial]"));
        assert!(toml_str.contains("[logging]"));
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let toml_str = r#"
            [serial]
            disable_probe = true
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.serial.disable_probe);
        // Defaults should still apply to omitted keys.
        assert_eq!(config.serial.default_baud, 9600);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[serial]\ndefault_baud = 115200").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.serial.default_baud, 115200);
    }

    #[test]
    fn test_from_file_missing() {
        let result = Config::from_file(Path::new("/nonexistent/serial-monitor.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_from_file_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[serial\ndefault_baud = oops").unwrap();

        let result = Config::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
