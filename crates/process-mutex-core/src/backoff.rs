//! Poll interval schedule for lock acquisition.

use std::time::Duration;

/// Default time to wait for a lock before giving up.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Upper bound for the doubling poll interval.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(200);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Doubling poll interval capped at [`MAX_POLL_INTERVAL`].
///
/// With the default initial interval the sequence is
/// 5, 10, 20, 40, 80, 160, 200, 200, ... milliseconds.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
}

impl Backoff {
    /// Creates a schedule starting at `initial`.
    ///
    /// A zero interval is raised to one millisecond so doubling still progresses.
    pub fn new(initial: Duration) -> Self {
        Self {
            current: initial.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL.max(initial)),
        }
    }

    /// Returns the interval to sleep now and advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(MAX_POLL_INTERVAL);
        delay
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_POLL_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles_up_to_cap() {
        let mut backoff = Backoff::default();
        let delays: Vec<u64> = (0..9)
            .map(|_| backoff.next_delay().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 80, 160, 200, 200, 200]);
    }

    #[test]
    fn zero_interval_still_progresses() {
        let mut backoff = Backoff::new(Duration::ZERO);
        assert_eq!(backoff.next_delay(), Duration::from_millis(1));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2));
    }

    #[test]
    fn initial_interval_above_cap_is_kept_then_capped() {
        let mut backoff = Backoff::new(Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), MAX_POLL_INTERVAL);
    }
}
