//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/oppstats/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/oppstats/` (~/.config/oppstats/)
//! - Data: `$XDG_DATA_HOME/oppstats/` (~/.local/share/oppstats/)
//! - State/Logs: `$XDG_STATE_HOME/oppstats/` (~/.local/state/oppstats/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Metrics engine tuning
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metrics engine configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    /// Trailing window (days, today included) used by the platform summary
    #[serde(default = "default_summary_window_days")]
    pub summary_window_days: u32,

    /// Limit used by top-N reads when the caller passes 0
    #[serde(default = "default_top_limit")]
    pub default_top_limit: usize,

    /// Upper bound on any top-N read
    #[serde(default = "default_max_top_limit")]
    pub max_top_limit: usize,

    /// Days of engagement history returned when the caller passes 0
    #[serde(default = "default_history_days")]
    pub default_history_days: u32,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            summary_window_days: default_summary_window_days(),
            default_top_limit: default_top_limit(),
            max_top_limit: default_max_top_limit(),
            default_history_days: default_history_days(),
        }
    }
}

impl MetricsConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.summary_window_days == 0 {
            return Err(Error::Config(
                "metrics.summary_window_days must be at least 1".to_string(),
            ));
        }
        if self.default_top_limit == 0 {
            return Err(Error::Config(
                "metrics.default_top_limit must be at least 1".to_string(),
            ));
        }
        if self.max_top_limit < self.default_top_limit {
            return Err(Error::Config(
                "metrics.max_top_limit must not be below metrics.default_top_limit".to_string(),
            ));
        }
        if self.default_history_days == 0 {
            return Err(Error::Config(
                "metrics.default_history_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve a caller-supplied top-N limit against the configured bounds.
    pub fn resolve_top_limit(&self, requested: usize) -> usize {
        if requested == 0 {
            self.default_top_limit
        } else {
            requested.min(self.max_top_limit)
        }
    }
}

fn default_summary_window_days() -> u32 {
    7
}

fn default_top_limit() -> usize {
    10
}

fn default_max_top_limit() -> usize {
    100
}

fn default_history_days() -> u32 {
    30
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.metrics.validate()?;
        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/oppstats/config.toml` (~/.config/oppstats/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("oppstats").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/oppstats/` (~/.local/share/oppstats/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("oppstats")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/oppstats/` (~/.local/state/oppstats/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("oppstats")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/oppstats/metrics.db` (~/.local/share/oppstats/metrics.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("metrics.db")
    }
}
