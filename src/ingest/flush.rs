use std::time::Duration;

/// Count-or-time rule deciding when the collector persists its result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    count_threshold: usize,
    time_threshold: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(60))
    }
}

impl FlushPolicy {
    /// `count_threshold` is clamped to at least 1.
    pub fn new(count_threshold: usize, time_threshold: Duration) -> Self {
        Self {
            count_threshold: count_threshold.max(1),
            time_threshold,
        }
    }

    pub fn count_threshold(&self) -> usize {
        self.count_threshold
    }

    pub fn time_threshold(&self) -> Duration {
        self.time_threshold
    }

    pub fn should_flush(&self, completed_since_last_flush: usize, since_last_flush: Duration) -> bool {
        completed_since_last_flush >= self.count_threshold || since_last_flush >= self.time_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_or_time_triggers() {
        let policy = FlushPolicy::new(10, Duration::from_secs(30));
        assert!(!policy.should_flush(9, Duration::from_secs(29)));
        assert!(policy.should_flush(10, Duration::ZERO));
        assert!(policy.should_flush(1, Duration::from_secs(30)));
        assert!(policy.should_flush(0, Duration::from_secs(31)));
    }

    #[test]
    fn zero_count_threshold_is_clamped() {
        let policy = FlushPolicy::new(0, Duration::from_secs(3600));
        assert_eq!(policy.count_threshold(), 1);
        assert!(!policy.should_flush(0, Duration::ZERO));
        assert!(policy.should_flush(1, Duration::ZERO));
    }
}
