use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::filter::{self, ParsedFilter};
use crate::provider::{LogProvider, ProviderError};
use runscope_types::LogEntry;

/// How far back generated history reaches when the provider is created
const DEFAULT_HISTORY_SPAN_MINUTES: i64 = 30;

/// Oldest generated records are discarded beyond this count
const MAX_HISTORY: usize = 50_000;

const MIN_GAP_MS: i64 = 500;
const MAX_GAP_MS: i64 = 2_000;

/// Message catalogue per severity
const CATALOGUE: &[(&str, &[&str])] = &[
    (
        "ERROR",
        &[
            "Failed to connect to database",
            "Invalid configuration detected",
            "Upstream request timed out after {ms}ms",
        ],
    ),
    (
        "WARNING",
        &[
            "High memory usage detected: {mb}MB",
            "Retrying failed request",
            "ERROR: Operation completed with warnings",
        ],
    ),
    (
        "INFO",
        &[
            "Request processed successfully",
            "Processing request from {region}",
            "Response time: {ms}ms",
            "Background task completed",
        ],
    ),
    (
        "DEBUG",
        &[
            "Connection pool stats: active=5",
            "Cache hit ratio: 85%",
            "Request headers received",
        ],
    ),
    (
        "DEFAULT",
        &[
            "System status check completed",
            "Starting scheduled job",
        ],
    ),
];

const REGIONS: &[&str] = &["us-east1", "europe-west4", "asia-east1"];

/// Synthetic log source for demos and offline use.
///
/// History is generated lazily up to the current time on each fetch, so
/// polling sees a steady trickle of new records.
pub struct MockLogProvider {
    service_name: String,
    state: Mutex<MockState>,
}

struct MockState {
    rng: StdRng,
    history: Vec<LogEntry>,
    generated_until: DateTime<Utc>,
}

impl MockLogProvider {
    /// Create a provider seeded from system entropy
    pub fn new(service_name: impl Into<String>) -> Self {
        Self::with_rng(service_name.into(), StdRng::from_entropy())
    }

    /// Create a provider with reproducible output
    pub fn seeded(service_name: impl Into<String>, seed: u64) -> Self {
        Self::with_rng(service_name.into(), StdRng::seed_from_u64(seed))
    }

    fn with_rng(service_name: String, rng: StdRng) -> Self {
        Self {
            service_name,
            state: Mutex::new(MockState {
                rng,
                history: Vec::new(),
                generated_until: Utc::now() - Duration::minutes(DEFAULT_HISTORY_SPAN_MINUTES),
            }),
        }
    }

    /// Start generated history `span` before now, discarding anything generated so far
    pub fn with_history_span(self, span: Duration) -> Self {
        {
            let mut state = self.state.lock();
            state.history.clear();
            state.generated_until = Utc::now() - span;
        }
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Records matching `filter` as of `now`
    fn query(&self, filter: &ParsedFilter, page_size: usize, now: DateTime<Utc>) -> Vec<LogEntry> {
        if !filter.matches_source(Some(self.service_name.as_str())) {
            return Vec::new();
        }

        let mut state = self.state.lock();
        state.extend_to(now, &self.service_name);

        let start = match filter.cutoff() {
            Some(cutoff) => state.history.partition_point(|e| e.timestamp < cutoff),
            None => 0,
        };
        state.history[start..]
            .iter()
            .take(page_size)
            .cloned()
            .collect()
    }
}

impl MockState {
    fn extend_to(&mut self, now: DateTime<Utc>, service_name: &str) {
        loop {
            let gap = Duration::milliseconds(self.rng.gen_range(MIN_GAP_MS..MAX_GAP_MS));
            let next = self.generated_until + gap;
            if next > now {
                break;
            }
            let entry = self.generate(next, service_name);
            self.history.push(entry);
            self.generated_until = next;
        }

        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }

    fn generate(&mut self, timestamp: DateTime<Utc>, service_name: &str) -> LogEntry {
        let (severity, messages) = CATALOGUE[self.rng.gen_range(0..CATALOGUE.len())];
        let template = messages[self.rng.gen_range(0..messages.len())];

        let message = template
            .replace("{ms}", &self.rng.gen_range(10..1000).to_string())
            .replace("{mb}", &self.rng.gen_range(100..1000).to_string())
            .replace("{region}", REGIONS[self.rng.gen_range(0..REGIONS.len())]);

        LogEntry::new(timestamp, severity, format!("[{}] {}", service_name, message))
    }
}

impl LogProvider for MockLogProvider {
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
        let entries = self.query(&parsed, page_size, Utc::now());
        trace!(service = %self.service_name, count = entries.len(), "generated mock page");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> MockLogProvider {
        MockLogProvider::seeded("web-frontend", 7).with_history_span(Duration::minutes(5))
    }

    #[tokio::test]
    async fn test_history_is_sorted_and_tagged() {
        let mock = provider();
        let base = mock.base_filter("web-frontend");
        let page = mock.fetch_logs(&base, 1000).await.unwrap();

        // Five minutes at 0.5-2s per record
        assert!(page.len() >= 150, "only {} records", page.len());
        assert!(page.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));
        assert!(page.iter().all(|e| e.message.starts_with("[web-frontend] ")));
        assert!(page.iter().all(|e| !e.message.contains('{')));
    }

    #[tokio::test]
    async fn test_page_size_and_cutoff_respected() {
        let mock = provider();
        let base = mock.base_filter("web-frontend");
        let first = mock.fetch_logs(&base, 10).await.unwrap();
        assert_eq!(first.len(), 10);

        let cutoff = first[4].timestamp;
        let filter = mock.build_filter(&base, Some(cutoff));
        let next = mock.fetch_logs(&filter, 3).await.unwrap();
        assert_eq!(next.len(), 3);
        assert_eq!(next[0], first[4]);
        assert!(next.iter().all(|e| e.timestamp >= cutoff));
    }

    #[tokio::test]
    async fn test_other_service_sees_nothing() {
        let mock = provider();
        let filter = mock.base_filter("api-backend");
        assert!(mock.fetch_logs(&filter, 100).await.unwrap().is_empty());
    }

    #[test]
    fn test_generation_stops_at_now() {
        let mock = provider();
        let now = Utc::now();
        let parsed = ParsedFilter::parse(&mock.base_filter("web-frontend")).unwrap();
        let entries = mock.query(&parsed, usize::MAX, now);
        assert!(entries.iter().all(|e| e.timestamp <= now));

        let future = ParsedFilter::parse(&filter::with_cutoff(
            &mock.base_filter("web-frontend"),
            Some(now + Duration::hours(1)),
        ))
        .unwrap();
        assert!(mock.query(&future, 100, now).is_empty());
    }
}
