//! Filter grammar shared by the local providers.
//!
//! A filter is `source="<id>"`, optionally followed by one or more
//! ` AND timestamp>="<RFC3339>"` clauses. The timestamp comparison is
//! inclusive, matching the managed logging API.

use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;

use crate::provider::ProviderError;
use runscope_types::LogEntry;

static SOURCE_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"source="((?:[^"\\]|\\.)*)""#).expect("valid source regex"));

static CUTOFF_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"timestamp>="([^"]+)""#).expect("valid cutoff regex"));

/// Base filter selecting every record of a source
pub fn source_filter(source_id: &str) -> String {
    let escaped = source_id.replace('\\', "\\\\").replace('"', "\\\"");
    format!(r#"source="{}""#, escaped)
}

/// Append a cutoff clause to a filter
pub fn with_cutoff(base_filter: &str, cutoff: Option<DateTime<Utc>>) -> String {
    match cutoff {
        Some(ts) => format!(r#"{} AND timestamp>="{}""#, base_filter, format_timestamp(ts)),
        None => base_filter.to_string(),
    }
}

/// RFC3339 with nanosecond precision, the resolution every filter uses
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// A filter string broken back into its clauses
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedFilter {
    /// Source the filter is restricted to (None = any)
    source: Option<String>,

    /// Inclusive lower bound on timestamps (None = unbounded)
    cutoff: Option<DateTime<Utc>>,
}

impl ParsedFilter {
    /// Parse a filter produced by [`source_filter`] and [`with_cutoff`]
    pub fn parse(filter: &str) -> Result<Self, ProviderError> {
        let source = SOURCE_CLAUSE
            .captures(filter)
            .map(|caps| unescape(&caps[1]));

        let mut cutoff: Option<DateTime<Utc>> = None;
        for caps in CUTOFF_CLAUSE.captures_iter(filter) {
            let ts = DateTime::parse_from_rfc3339(&caps[1])
                .map_err(|e| ProviderError::InvalidFilter(format!("{}: {}", &caps[1], e)))?
                .with_timezone(&Utc);
            // Several clauses combine with AND, so the latest bound wins
            cutoff = Some(cutoff.map_or(ts, |current| current.max(ts)));
        }

        Ok(Self { source, cutoff })
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn cutoff(&self) -> Option<DateTime<Utc>> {
        self.cutoff
    }

    /// Whether this filter selects records from `source`
    pub fn matches_source(&self, source: Option<&str>) -> bool {
        match (&self.source, source) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => true,
        }
    }

    /// Whether an entry from `source` passes every clause
    pub fn matches(&self, source: Option<&str>, entry: &LogEntry) -> bool {
        if !self.matches_source(source) {
            return false;
        }
        match self.cutoff {
            Some(cutoff) => entry.timestamp >= cutoff,
            None => true,
        }
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(nanos: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap() + chrono::Duration::nanoseconds(nanos as i64)
    }

    #[test]
    fn test_parse_base_filter() {
        let parsed = ParsedFilter::parse(&source_filter("api-backend")).unwrap();
        assert_eq!(parsed.source(), Some("api-backend"));
        assert_eq!(parsed.cutoff(), None);
    }

    #[test]
    fn test_cutoff_keeps_nanoseconds() {
        let filter = with_cutoff(&source_filter("web"), Some(at(123_456_789)));
        assert!(filter.ends_with(r#"timestamp>="2024-01-15T10:30:00.123456789Z""#));

        let parsed = ParsedFilter::parse(&filter).unwrap();
        assert_eq!(parsed.cutoff(), Some(at(123_456_789)));
    }

    #[test]
    fn test_cutoff_is_inclusive() {
        let parsed = ParsedFilter::parse(&with_cutoff(&source_filter("web"), Some(at(10)))).unwrap();
        assert!(parsed.matches(Some("web"), &LogEntry::new(at(10), "INFO", "edge")));
        assert!(!parsed.matches(Some("web"), &LogEntry::new(at(9), "INFO", "before")));
        assert!(!parsed.matches(Some("other"), &LogEntry::new(at(11), "INFO", "wrong source")));
        assert!(parsed.matches(None, &LogEntry::new(at(11), "INFO", "untagged")));
    }

    #[test]
    fn test_latest_cutoff_wins() {
        let filter = with_cutoff(&with_cutoff(&source_filter("web"), Some(at(5))), Some(at(1)));
        assert_eq!(ParsedFilter::parse(&filter).unwrap().cutoff(), Some(at(5)));
    }

    #[test]
    fn test_quoted_source_round_trip() {
        let parsed = ParsedFilter::parse(&source_filter(r#"odd"name"#)).unwrap();
        assert_eq!(parsed.source(), Some(r#"odd"name"#));
    }

    #[test]
    fn test_invalid_timestamp() {
        let err = ParsedFilter::parse(r#"source="web" AND timestamp>="yesterday""#).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidFilter(_)));
    }
}
