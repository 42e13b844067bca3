use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::filter::{self, ParsedFilter};
use crate::provider::{LogProvider, ProviderError};
use runscope_types::LogEntry;

/// One line of a JSON-lines log export
#[derive(Debug, Deserialize)]
struct FileRecord {
    timestamp: DateTime<Utc>,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    message: String,
    #[serde(default, alias = "service")]
    source: Option<String>,
}

/// Provider backed by a JSON-lines file, re-read on every fetch so that
/// appended lines show up while tailing
pub struct FileLogProvider {
    path: PathBuf,
}

impl FileLogProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse, filter, sort and truncate the contents of a log file
fn select_entries(contents: &str, filter: &ParsedFilter, page_size: usize) -> Vec<LogEntry> {
    let mut entries: Vec<LogEntry> = contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(idx, line)| match serde_json::from_str::<FileRecord>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(line = idx + 1, error = %e, "skipping malformed log line");
                None
            }
        })
        .filter_map(|record| {
            let entry = LogEntry::new(record.timestamp, record.severity, record.message);
            filter
                .matches(record.source.as_deref(), &entry)
                .then_some(entry)
        })
        .collect();

    entries.sort_by_key(|e| e.timestamp);
    entries.truncate(page_size);
    entries
}

impl LogProvider for FileLogProvider {
    fn base_filter(&self, source_id: &str) -> String {
        filter::source_filter(source_id)
    }

    fn build_filter(&self, base_filter: &str, cutoff: Option<DateTime<Utc>>) -> String {
        filter::with_cutoff(base_filter, cutoff)
    }

    async fn fetch_logs(
        &self,
        filter: &str,
        page_size: usize,
    ) -> Result<Vec<LogEntry>, ProviderError> {
        let parsed = ParsedFilter::parse(filter)?;
        let contents = tokio::fs::read_to_string(&self.path).await?;
        Ok(select_entries(&contents, &parsed, page_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{"timestamp":"2024-01-15T10:30:03Z","severity":"ERROR","message":"disk full","source":"api"}
{"timestamp":"2024-01-15T10:30:01Z","severity":"INFO","message":"started","source":"api"}
not json at all
{"timestamp":"2024-01-15T10:30:02Z","severity":"INFO","message":"other service","service":"web"}

{"timestamp":"2024-01-15T10:30:02.500Z","message":"untagged"}
"#;

    fn write_sample() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_reads_sorted_and_filtered() {
        let file = write_sample();
        let provider = FileLogProvider::new(file.path());

        let entries = provider
            .fetch_logs(&provider.base_filter("api"), 100)
            .await
            .unwrap();
        let messages: Vec<_> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["started", "untagged", "disk full"]);
        assert_eq!(entries[1].severity, "");
    }

    #[tokio::test]
    async fn test_cutoff_and_page_size() {
        let file = write_sample();
        let provider = FileLogProvider::new(file.path());
        let cutoff = "2024-01-15T10:30:02Z".parse::<DateTime<Utc>>().unwrap();
        let filter = provider.build_filter(&provider.base_filter("api"), Some(cutoff));

        let entries = provider.fetch_logs(&filter, 1).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "untagged");
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let provider = FileLogProvider::new("/nonexistent/runscope/logs.jsonl");
        let err = provider
            .fetch_logs(&provider.base_filter("api"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Io(_)));
    }
}
