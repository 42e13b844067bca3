use chrono::{Local, SecondsFormat};

use runscope_logs::LogEntry;

/// How entries are written to stdout
#[derive(Clone, Copy, Debug, Default)]
pub struct LineFormat {
    /// Show timestamps in local time instead of UTC
    pub local_time: bool,
}

impl LineFormat {
    pub fn format(&self, entry: &LogEntry) -> String {
        let timestamp = if self.local_time {
            entry
                .timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S%.3f")
                .to_string()
        } else {
            entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
        };

        let severity = if entry.severity.is_empty() {
            "DEFAULT"
        } else {
            entry.severity.as_str()
        };

        format!("{} [{}] {}", timestamp, severity, entry.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_utc_line() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let line = LineFormat::default().format(&LogEntry::new(ts, "WARNING", "disk 90% full"));
        assert_eq!(line, "2024-01-15T10:30:00.000Z [WARNING] disk 90% full");
    }

    #[test]
    fn test_missing_severity_shown_as_default() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let line = LineFormat::default().format(&LogEntry::new(ts, "", "hello"));
        assert!(line.contains("[DEFAULT] hello"));
    }
}
