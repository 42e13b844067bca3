use std::time::Duration;

use thiserror::Error;

use runscope_types::TimeWindow;

/// Default interval for draining the buffer
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(500);
/// Default number of entries buffered before a forced flush
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_MIN_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.5;
pub const DEFAULT_FINAL_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Tuning for a tail session
#[derive(Clone, Debug)]
pub struct TailConfig {
    /// How often buffered entries are delivered regardless of poll activity
    pub flush_interval: Duration,

    /// Buffer length that triggers an immediate flush
    pub batch_size: usize,

    /// Maximum records requested per fetch
    pub page_size: usize,

    /// Fastest poll rate, used whenever new entries arrive
    pub min_poll_interval: Duration,

    /// Slowest poll rate reached after repeated empty polls
    pub max_poll_interval: Duration,

    /// Multiplier applied to the poll interval after an empty poll
    pub backoff_factor: f64,

    /// Backfill windows, smallest first
    pub time_windows: Vec<TimeWindow>,

    /// Capacity of the outbound channel
    pub channel_capacity: usize,

    /// Upper bound on the last flush after cancellation
    pub final_flush_timeout: Duration,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            page_size: DEFAULT_BATCH_SIZE,
            min_poll_interval: DEFAULT_MIN_POLL_INTERVAL,
            max_poll_interval: DEFAULT_MAX_POLL_INTERVAL,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            time_windows: TimeWindow::defaults(),
            channel_capacity: DEFAULT_BATCH_SIZE,
            final_flush_timeout: DEFAULT_FINAL_FLUSH_TIMEOUT,
        }
    }
}

impl TailConfig {
    /// Check that the settings describe a session that can make progress
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::ZeroChannelCapacity);
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::ZeroFlushInterval);
        }
        if self.min_poll_interval.is_zero() || self.min_poll_interval > self.max_poll_interval {
            return Err(ConfigError::PollBounds {
                min: self.min_poll_interval,
                max: self.max_poll_interval,
            });
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor <= 1.0 {
            return Err(ConfigError::BackoffFactor(self.backoff_factor));
        }
        if self.time_windows.is_empty() {
            return Err(ConfigError::NoTimeWindows);
        }
        Ok(())
    }
}

/// Invalid tail configuration
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("batch size must be at least 1")]
    ZeroBatchSize,

    #[error("page size must be at least 1")]
    ZeroPageSize,

    #[error("channel capacity must be at least 1")]
    ZeroChannelCapacity,

    #[error("flush interval must be greater than zero")]
    ZeroFlushInterval,

    #[error("poll interval bounds are invalid (min {min:?}, max {max:?})")]
    PollBounds { min: Duration, max: Duration },

    #[error("backoff factor must be a finite number greater than 1, got {0}")]
    BackoffFactor(f64),

    #[error("at least one backfill time window is required")]
    NoTimeWindows,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TailConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.time_windows.len(), 4);
        assert_eq!(config.channel_capacity, config.batch_size);
    }

    #[test]
    fn test_rejects_inverted_poll_bounds() {
        let config = TailConfig {
            min_poll_interval: Duration::from_secs(10),
            max_poll_interval: Duration::from_secs(5),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PollBounds { .. })
        ));
    }

    #[test]
    fn test_rejects_non_growing_backoff() {
        for factor in [1.0, 0.5, f64::NAN, f64::INFINITY] {
            let config = TailConfig {
                backoff_factor: factor,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::BackoffFactor(_))
            ));
        }
    }

    #[test]
    fn test_rejects_empty_sizes_and_windows() {
        let config = TailConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroBatchSize));

        let config = TailConfig {
            time_windows: Vec::new(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoTimeWindows));
    }
}
