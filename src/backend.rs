use chrono::{DateTime, Utc};

use runscope_gcp::CloudLoggingProvider;
use runscope_logs::{FileLogProvider, LogEntry, LogProvider, MockLogProvider, ProviderError};

/// The provider selected on the command line
pub enum Backend {
    Mock(MockLogProvider),
    File(FileLogProvider),
    Cloud(CloudLoggingProvider),
}

impl Backend {
    /// Short label for the status line
    pub fn label(&self) -> &'static str {
        match self {
            Self::Mock(_) => "mock",
            Self::File(_) => "file",
            Self::Cloud(_) => "cloud logging",
        }
    }
}

impl LogProvider for Backend {
    fn base_filter(&self, source_id: &str) -> String {
        match self {
            Self::Mock(p) => p.base_filter(source_id),
            Self::File(p) => p.base_filter(source_id),
            Self::Cloud(p) => p.base_filter(source_id),
        }
    }

    fn build_filter(&self, base_filter: &str, cutoff: Option<DateTime<Utc>>) -> String {
        match self {
            Self::Mock(p) => p.build_filter(base_filter, cutoff),
            Self::File(p) => p.build_filter(base_filter, cutoff),
            Self::Cloud(p) => p.build_filter(base_filter, cutoff),
        }
    }

    async fn fetch_logs(
        &self,
        filter: &str,
        page_size: usize,
    ) -> Result<Vec<LogEntry>, ProviderError> {
        match self {
            Self::Mock(p) => p.fetch_logs(filter, page_size).await,
            Self::File(p) => p.fetch_logs(filter, page_size).await,
            Self::Cloud(p) => p.fetch_logs(filter, page_size).await,
        }
    }
}
