//! Process configuration read from the environment.
//!
//! Policy settings live in the settings store; this only covers where that
//! store lives and how the process logs.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::platform;

pub const ENV_DATA_DIR: &str = "TABKEEPER_DATA_DIR";
pub const ENV_LOG_LEVEL: &str = "TABKEEPER_LOG";
pub const ENV_LOG_FORMAT: &str = "TABKEEPER_LOG_FORMAT";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}. Expected pretty or json")),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Everything a binary needs before it can build a [`crate::engine::PolicyEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub log: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: platform::get_data_dir(),
            log: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reads the `TABKEEPER_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable lookup. Unparseable values
    /// fall back to defaults with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|d| !d.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|l| !l.trim().is_empty()) {
            config.log.level = level;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            match format.parse() {
                Ok(format) => config.log.format = format,
                Err(e) => tracing::warn!(error = %e, "ignoring {}", ENV_LOG_FORMAT),
            }
        }
        config
    }

    pub fn database_path(&self) -> PathBuf {
        platform::database_path(&self.data_dir)
    }
}
