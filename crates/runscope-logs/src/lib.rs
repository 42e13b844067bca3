//! Log tailing for runscope
//!
//! This crate turns page-based log providers into continuous, ordered,
//! de-duplicated streams, and ships the local providers.

mod buffer;
mod config;
mod file;
pub mod filter;
mod interval;
mod mock;
mod provider;
mod tail;

pub use buffer::BatchBuffer;
pub use config::{
    ConfigError, DEFAULT_BACKOFF_FACTOR, DEFAULT_BATCH_SIZE, DEFAULT_FINAL_FLUSH_TIMEOUT,
    DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_POLL_INTERVAL, DEFAULT_MIN_POLL_INTERVAL, TailConfig,
};
pub use file::FileLogProvider;
pub use interval::PollInterval;
pub use mock::MockLogProvider;
pub use provider::{LogProvider, ProviderError};
pub use tail::{LogTail, LogTailer, TailSummary};

// Re-export types used in our public API
pub use runscope_types::{CloudProviderOptions, LogEntry, TimeWindow};
