use std::time::Duration;

#[derive(Copy, Clone, Debug)]
/// Bounded exponential backoff applied to failed batch flushes.
pub struct RetryPolicy {
    /// Coefficient to multiply initial_interval with for every past attempt.
    backoff_coefficient: u32,
    /// The backoff interval after the first failure.
    initial_interval: Duration,
    /// The maximum possible backoff between attempts.
    maximum_interval: Option<Duration>,
    /// Attempts, the first one included, before giving up.
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(
        backoff_coefficient: u32,
        initial_interval: Duration,
        maximum_interval: Option<Duration>,
        max_attempts: u32,
    ) -> Self {
        Self {
            backoff_coefficient,
            initial_interval,
            maximum_interval,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt is allowed after `attempts` have failed.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// How long to wait after the `attempt`-th failure (starting at 1).
    pub fn time_until_next_retry(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let candidate_interval = self
            .backoff_coefficient
            .checked_pow(exponent)
            .and_then(|factor| self.initial_interval.checked_mul(factor))
            .unwrap_or(Duration::MAX);

        match self.maximum_interval {
            Some(max_interval) => std::cmp::min(candidate_interval, max_interval),
            None => candidate_interval,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_coefficient: 2,
            initial_interval: Duration::from_millis(500),
            maximum_interval: Some(Duration::from_secs(30)),
            max_attempts: 5,
        }
    }
}
