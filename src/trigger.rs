//! Decides when the current batch has to be flushed
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// batch reached capacity
    Size,
    /// batch went stale while the topic was idle
    Timeout,
    /// final drain before exit
    Shutdown,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlushReason::Size => "size",
            FlushReason::Timeout => "timeout",
            FlushReason::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

pub struct FlushTrigger {
    timeout: Duration,
    last_flush_at: Instant,
}

impl FlushTrigger {
    pub fn new(timeout: Duration) -> FlushTrigger {
        FlushTrigger {
            timeout,
            last_flush_at: Instant::now(),
        }
    }

    /// Size arm, evaluated right after every append
    pub fn after_append(&self, is_full: bool) -> Option<FlushReason> {
        is_full.then_some(FlushReason::Size)
    }

    /// Timeout arm, evaluated only on polls that returned no message. Staleness may therefore
    /// overshoot the timeout by up to one poll wait.
    pub fn when_idle(&self, now: Instant, pending: usize) -> Option<FlushReason> {
        (pending > 0 && now.saturating_duration_since(self.last_flush_at) > self.timeout)
            .then_some(FlushReason::Timeout)
    }

    /// Restarts the clock. Called on every flush, whether it succeeded or not.
    pub fn reset(&mut self, now: Instant) {
        self.last_flush_at = now;
    }

    #[cfg(test)]
    fn last_flush_at(&self) -> Instant {
        self.last_flush_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_arm_fires_only_when_full() {
        let trigger = FlushTrigger::new(Duration::from_secs(30));
        assert_eq!(trigger.after_append(false), None);
        assert_eq!(trigger.after_append(true), Some(FlushReason::Size));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_arm_needs_elapsed_time_and_pending_rows() {
        let trigger = FlushTrigger::new(Duration::from_secs(30));
        let start = trigger.last_flush_at();

        assert_eq!(trigger.when_idle(start + Duration::from_secs(29), 2), None);
        assert_eq!(trigger.when_idle(start + Duration::from_secs(30), 2), None);
        assert_eq!(
            trigger.when_idle(start + Duration::from_secs(31), 2),
            Some(FlushReason::Timeout)
        );
        assert_eq!(trigger.when_idle(start + Duration::from_secs(31), 0), None);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_restarts_the_clock() {
        let mut trigger = FlushTrigger::new(Duration::from_secs(30));
        let start = trigger.last_flush_at();
        trigger.reset(start + Duration::from_secs(40));
        assert_eq!(trigger.when_idle(start + Duration::from_secs(41), 1), None);
        assert_eq!(
            trigger.when_idle(start + Duration::from_secs(71), 1),
            Some(FlushReason::Timeout)
        );
    }
}
