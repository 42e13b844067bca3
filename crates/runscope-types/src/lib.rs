//! Shared types for runscope
//!
//! This crate contains data structures used across multiple runscope crates.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Log Types
// ============================================================================

/// Severity names used for entries the tailer generates itself.
/// Provider entries carry whatever severity string the backend reports.
pub mod severity {
    pub const DEFAULT: &str = "DEFAULT";
    pub const DEBUG: &str = "DEBUG";
    pub const INFO: &str = "INFO";
    pub const WARNING: &str = "WARNING";
    pub const ERROR: &str = "ERROR";
}

/// A single log record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the record was written
    pub timestamp: DateTime<Utc>,

    /// Severity as reported by the backend (e.g. INFO, WARNING)
    #[serde(default)]
    pub severity: String,

    /// Message text
    #[serde(default)]
    pub message: String,
}

impl LogEntry {
    pub fn new(
        timestamp: DateTime<Utc>,
        severity: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            severity: severity.into(),
            message: message.into(),
        }
    }

    /// Informational status entry stamped with the current time
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Utc::now(), severity::INFO, message)
    }

    /// Warning status entry stamped with the current time
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Utc::now(), severity::WARNING, message)
    }

    /// Error status entry stamped with the current time
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Utc::now(), severity::ERROR, message)
    }
}

/// A look-back window tried while searching for initial history
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    /// How far back to look. Zero means unbounded.
    pub duration: Duration,

    /// Human readable label, e.g. "last hour"
    pub description: String,
}

impl TimeWindow {
    pub fn new(duration: Duration, description: impl Into<String>) -> Self {
        Self {
            duration,
            description: description.into(),
        }
    }

    /// Window covering all available history
    pub fn unbounded(description: impl Into<String>) -> Self {
        Self::new(Duration::ZERO, description)
    }

    pub fn is_unbounded(&self) -> bool {
        self.duration.is_zero()
    }

    /// Earliest timestamp covered by this window, or None when unbounded
    pub fn start_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_unbounded() {
            return None;
        }
        let span = chrono::Duration::from_std(self.duration).ok()?;
        now.checked_sub_signed(span)
    }

    /// Standard backfill windows, smallest first
    pub fn defaults() -> Vec<TimeWindow> {
        vec![
            TimeWindow::new(Duration::from_secs(10 * 60), "last 10 minutes"),
            TimeWindow::new(Duration::from_secs(60 * 60), "last hour"),
            TimeWindow::new(Duration::from_secs(24 * 60 * 60), "last 24 hours"),
            TimeWindow::unbounded("all time"),
        ]
    }
}

// ============================================================================
// Cloud Resource Types
// ============================================================================

/// Identifies what a tail session is following
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CloudProviderOptions {
    /// Service (log source) name
    pub source_id: String,
    pub region: String,
    pub project_id: Option<String>,
}

impl CloudProviderOptions {
    pub fn new(source_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            region: region.into(),
            project_id: None,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_windows_smallest_first() {
        let windows = TimeWindow::defaults();
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[0].description, "last 10 minutes");
        assert!(windows[3].is_unbounded());

        let bounded: Vec<_> = windows.iter().take(3).map(|w| w.duration).collect();
        assert!(bounded.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_window_start() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let hour = TimeWindow::new(Duration::from_secs(3600), "last hour");
        assert_eq!(
            hour.start_from(now),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap())
        );
        assert_eq!(TimeWindow::unbounded("all time").start_from(now), None);
    }

    #[test]
    fn test_entry_json_defaults() {
        let entry: LogEntry =
            serde_json::from_str(r#"{"timestamp":"2024-01-15T10:30:00.123456789Z"}"#).unwrap();
        assert_eq!(entry.severity, "");
        assert_eq!(entry.message, "");
        assert_eq!(entry.timestamp.timestamp_subsec_nanos(), 123_456_789);
    }
}
