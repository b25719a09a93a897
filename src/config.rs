//! Configuration Management
//!
//! Handles persistent user-level settings for wsctl. Workspace state lives in
//! the directory tree instead (see [`crate::context`]).

use anyhow::{Context as _, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;

/// Default image for the docker runner
pub const DEFAULT_DOCKER_IMAGE: &str = "wsctl/tools:stable";

const CONFIG_FILENAME: &str = "config.json";
const LOG_FILENAME: &str = "wsctl.log";

/// Where tool invocations run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    #[default]
    Local,
    Docker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Base URL of the workspace service
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub runner: RunnerKind,
    /// Image used by the docker runner
    #[serde(default)]
    pub docker_image: Option<String>,
    #[serde(default)]
    pub log_level: LogLevel,
    /// Interactive user the local credentials must belong to
    #[serde(default)]
    pub user_email: Option<String>,
    /// Service identity acting on behalf of the user
    #[serde(default)]
    pub service_account_email: Option<String>,
    /// Skip the application default credentials check (test environments only)
    #[serde(default)]
    pub skip_credential_check: bool,
}

impl Config {
    /// Directory holding the config file and the log file.
    ///
    /// `WSCTL_CONFIG_DIR` wins over the platform config directory.
    pub fn config_dir() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("WSCTL_CONFIG_DIR") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|p| p.join("wsctl"))
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join(CONFIG_FILENAME))
    }

    pub fn log_path() -> PathBuf {
        if let Some(dir) = Self::config_dir() {
            return dir.join(LOG_FILENAME);
        }
        if let Some(home) = dirs::home_dir() {
            return home.join(".wsctl").join(LOG_FILENAME);
        }
        PathBuf::from(LOG_FILENAME)
    }

    /// Load configuration from disk, falling back to defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config file {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }

    pub fn effective_docker_image(&self) -> &str {
        self.docker_image.as_deref().unwrap_or(DEFAULT_DOCKER_IMAGE)
    }

    /// Set a single key from its string form (`wsctl config set`)
    pub fn set_value(&mut self, key: &str, value: &str) -> crate::Result<()> {
        let optional = |v: &str| {
            if v.is_empty() {
                None
            } else {
                Some(v.to_string())
            }
        };
        match key {
            "server-url" => {
                if !value.is_empty() {
                    url::Url::parse(value).map_err(|e| {
                        crate::Error::Config(format!("invalid server url {value:?}: {e}"))
                    })?;
                }
                self.server_url = optional(value);
            },
            "runner" => {
                self.runner = RunnerKind::from_str(value, true)
                    .map_err(|e| crate::Error::Config(format!("invalid runner: {e}")))?;
            },
            "docker-image" => self.docker_image = optional(value),
            "log-level" => {
                self.log_level = LogLevel::from_str(value, true)
                    .map_err(|e| crate::Error::Config(format!("invalid log level: {e}")))?;
            },
            "user-email" => self.user_email = optional(value),
            "service-account-email" => self.service_account_email = optional(value),
            "skip-credential-check" => {
                self.skip_credential_check = value.parse().map_err(|_| {
                    crate::Error::Config(format!("expected true or false, got {value:?}"))
                })?;
            },
            other => return Err(crate::Error::Config(format!("unknown config key: {other}"))),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json"));
        assert_eq!(config, Config::default());
        assert_eq!(config.effective_docker_image(), DEFAULT_DOCKER_IMAGE);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILENAME);

        let mut config = Config::default();
        config.set_value("runner", "docker").unwrap();
        config.set_value("user-email", "ada@example.org").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded.runner, RunnerKind::Docker);
        assert_eq!(loaded.user_email.as_deref(), Some("ada@example.org"));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, r#"{"runner":"docker","color":"blue"}"#).unwrap();
        assert_eq!(Config::load_from(&path).runner, RunnerKind::Docker);
    }

    #[test]
    fn test_set_value_rejects_bad_input() {
        let mut config = Config::default();
        assert!(config.set_value("runner", "podman").is_err());
        assert!(config.set_value("server-url", "not a url").is_err());
        assert!(config.set_value("nope", "x").is_err());
    }
}
