use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;

use runscope_types::LogEntry;

/// A log-search backend the tailer can poll.
///
/// Implementations only answer bounded page requests; the tailer turns
/// those into a continuous stream. The tailer never issues two fetches at
/// once, so implementations need no internal coordination beyond being
/// shareable across sessions.
pub trait LogProvider: Send + Sync {
    /// Filter selecting every record of `source_id`, independent of time
    fn base_filter(&self, source_id: &str) -> String;

    /// Narrow `base_filter` to records at or after `cutoff`.
    /// Returns `base_filter` unchanged when there is no cutoff.
    fn build_filter(&self, base_filter: &str, cutoff: Option<DateTime<Utc>>) -> String;

    /// Fetch at most `page_size` records matching `filter`, oldest first.
    /// An empty result means nothing matched and is not an error.
    fn fetch_logs(
        &self,
        filter: &str,
        page_size: usize,
    ) -> impl Future<Output = Result<Vec<LogEntry>, ProviderError>> + Send;
}

/// Failure reported by a provider for a single fetch
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
