//! Config file support
//!
//! Reads `~/.runscope/config.toml` (or an explicit path). Every field is
//! optional; anything unset keeps the built-in default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use runscope_logs::{TailConfig, TimeWindow};

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub gcp: GcpSection,
    pub tail: TailSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GcpSection {
    pub project: Option<String>,
    pub region: Option<String>,
}

/// Overrides for the tail engine; durations in milliseconds
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TailSection {
    pub flush_interval_ms: Option<u64>,
    pub batch_size: Option<usize>,
    pub page_size: Option<usize>,
    pub min_poll_interval_ms: Option<u64>,
    pub max_poll_interval_ms: Option<u64>,
    pub backoff_factor: Option<f64>,
    pub channel_capacity: Option<usize>,
    pub final_flush_timeout_ms: Option<u64>,
    pub windows: Option<Vec<WindowSection>>,
}

/// A backfill window; `minutes = 0` means all history
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowSection {
    pub minutes: u64,
    pub description: String,
}

impl FileConfig {
    /// Default config location
    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::home_dir()?.join(".runscope").join("config.toml"))
    }

    /// Load from an explicit path, or from the default path if it exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::read(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::read(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

impl TailSection {
    /// Apply the overrides on top of `base`
    pub fn apply(&self, base: TailConfig) -> TailConfig {
        let ms = Duration::from_millis;
        let batch_size = self.batch_size.unwrap_or(base.batch_size);

        TailConfig {
            flush_interval: self.flush_interval_ms.map(ms).unwrap_or(base.flush_interval),
            batch_size,
            page_size: self.page_size.unwrap_or(base.page_size),
            min_poll_interval: self
                .min_poll_interval_ms
                .map(ms)
                .unwrap_or(base.min_poll_interval),
            max_poll_interval: self
                .max_poll_interval_ms
                .map(ms)
                .unwrap_or(base.max_poll_interval),
            backoff_factor: self.backoff_factor.unwrap_or(base.backoff_factor),
            time_windows: match &self.windows {
                Some(windows) => windows
                    .iter()
                    .map(|w| TimeWindow::new(Duration::from_secs(w.minutes * 60), &w.description))
                    .collect(),
                None => base.time_windows,
            },
            // The outbound channel follows the batch size unless set explicitly
            channel_capacity: self.channel_capacity.unwrap_or(batch_size),
            final_flush_timeout: self
                .final_flush_timeout_ms
                .map(ms)
                .unwrap_or(base.final_flush_timeout),
        }
    }
}
