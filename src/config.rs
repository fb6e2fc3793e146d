//! Application configuration.

use crate::media::mime::default_candidates;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Global configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// Export pipeline tuning.
    pub export: ExportConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Export pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportConfig {
    /// How long to wait for the source to report metadata.
    pub metadata_timeout_ms: u64,

    /// Encoder flush interval.
    pub chunk_interval_ms: u64,

    /// Frame rate used when the preset does not specify one.
    pub default_fps: u32,

    /// Target size used when neither preset nor source provide one.
    pub fallback_width: u32,
    pub fallback_height: u32,

    /// Lower bound of the safety timeout.
    pub min_safety_timeout_ms: u64,

    /// Added to the source duration to form the safety timeout.
    pub safety_margin_ms: u64,

    /// Redraw cadence when the source has no per-frame notifications.
    pub poll_interval_ms: u64,

    /// Encoder candidates, most preferred first.
    pub mime_candidates: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "open_recast=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            metadata_timeout_ms: 6000,
            chunk_interval_ms: 250,
            default_fps: 30,
            fallback_width: 1280,
            fallback_height: 720,
            min_safety_timeout_ms: 1500,
            safety_margin_ms: 4000,
            poll_interval_ms: 16,
            mime_candidates: default_candidates(),
        }
    }
}

impl ExportConfig {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "open_recast=debug,info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let Some(config_path) = config_file_path() else {
            tracing::warn!("No config directory on this platform, using defaults");
            return Self::default();
        };
        match Self::load_from(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                Self::default()
            }
        }
    }

    /// Load config from a file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Standard config file location, under the platform config directory.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("open-recast").join("config.json"))
}
