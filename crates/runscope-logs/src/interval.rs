use std::time::Duration;

use crate::config::TailConfig;

/// Adaptive wait between polls.
///
/// Snaps back to the minimum whenever a poll finds something and grows
/// geometrically while polls come back empty, never leaving `[min, max]`.
#[derive(Clone, Debug)]
pub struct PollInterval {
    current: Duration,
    min: Duration,
    max: Duration,
    factor: f64,
}

impl PollInterval {
    pub fn new(min: Duration, max: Duration, factor: f64) -> Self {
        let max = max.max(min);
        Self {
            current: min,
            min,
            max,
            factor,
        }
    }

    pub fn from_config(config: &TailConfig) -> Self {
        Self::new(
            config.min_poll_interval,
            config.max_poll_interval,
            config.backoff_factor,
        )
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Go back to the fastest rate
    pub fn reset(&mut self) {
        self.current = self.min;
    }

    /// Update after a poll and return the wait before the next one
    pub fn record(&mut self, found_new: bool) -> Duration {
        if found_new {
            self.current = self.min;
        } else {
            let grown = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.factor)
                .unwrap_or(self.max);
            self.current = grown.clamp(self.min, self.max);
        }
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval() -> PollInterval {
        PollInterval::new(Duration::from_secs(2), Duration::from_secs(30), 1.5)
    }

    #[test]
    fn test_backoff_sequence() {
        let mut poll = interval();
        assert_eq!(poll.current(), Duration::from_secs(2));
        assert_eq!(poll.record(false), Duration::from_secs(3));
        assert_eq!(poll.record(false), Duration::from_millis(4500));
        assert_eq!(poll.record(false), Duration::from_millis(6750));
    }

    #[test]
    fn test_backoff_caps_at_max() {
        let mut poll = interval();
        for _ in 0..20 {
            poll.record(false);
        }
        assert_eq!(poll.current(), Duration::from_secs(30));
        assert_eq!(poll.record(false), Duration::from_secs(30));
    }

    #[test]
    fn test_new_entries_reset() {
        let mut poll = interval();
        for _ in 0..5 {
            poll.record(false);
        }
        assert_eq!(poll.record(true), Duration::from_secs(2));

        poll.record(false);
        poll.reset();
        assert_eq!(poll.current(), Duration::from_secs(2));
    }
}
