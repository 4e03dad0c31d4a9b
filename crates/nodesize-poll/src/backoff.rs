//! Fetch failure bookkeeping.
//!
//! Tracks consecutive fetch failures for one supervisor, computes the next
//! delay with exponential backoff, and derives a health signal once
//! failures persist past a threshold.

use std::time::Duration;

use serde::Serialize;

/// Health of a supervisor's fetch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollHealth {
    /// No fetch has completed yet.
    Unknown,
    /// The last fetch succeeded, or failures are under the threshold.
    Healthy,
    /// Consecutive failures reached the degraded threshold.
    Degraded,
}

/// Tracks consecutive failures and the backoff interval.
#[derive(Debug)]
pub struct FailureTracker {
    health: PollHealth,
    consecutive_failures: u32,
    /// Failures before reporting `Degraded`. Zero disables degradation.
    degraded_threshold: u32,
    current_backoff: Duration,
    base_interval: Duration,
    max_backoff: Duration,
}

impl FailureTracker {
    /// Create a tracker. `max_backoff` is raised to `base_interval` if lower.
    pub fn new(base_interval: Duration, max_backoff: Duration, degraded_threshold: u32) -> Self {
        Self {
            health: PollHealth::Unknown,
            consecutive_failures: 0,
            degraded_threshold,
            current_backoff: base_interval,
            base_interval,
            max_backoff: max_backoff.max(base_interval),
        }
    }

    /// Record a successful fetch. Resets failures and backoff.
    pub fn record_success(&mut self) -> PollHealth {
        self.consecutive_failures = 0;
        self.current_backoff = self.base_interval;
        self.health = PollHealth::Healthy;
        self.health
    }

    /// Record a failed fetch. Doubles the backoff up to the cap.
    pub fn record_failure(&mut self) -> PollHealth {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.current_backoff = self
            .current_backoff
            .checked_mul(2)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff);

        // Unknown persists until a fetch succeeds or the threshold is hit.
        if self.degraded_threshold > 0 && self.consecutive_failures >= self.degraded_threshold {
            self.health = PollHealth::Degraded;
        } else if self.health != PollHealth::Unknown {
            self.health = PollHealth::Healthy;
        }
        self.health
    }

    pub fn health(&self) -> PollHealth {
        self.health
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Delay before the next fetch.
    pub fn next_interval(&self) -> Duration {
        self.current_backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(threshold: u32) -> FailureTracker {
        FailureTracker::new(Duration::from_secs(1), Duration::from_secs(60), threshold)
    }

    #[test]
    fn starts_unknown_at_base_interval() {
        let t = tracker(3);
        assert_eq!(t.health(), PollHealth::Unknown);
        assert_eq!(t.consecutive_failures(), 0);
        assert_eq!(t.next_interval(), Duration::from_secs(1));
    }

    #[test]
    fn backoff_doubles_per_failure() {
        let mut t = tracker(100);
        t.record_failure();
        assert_eq!(t.next_interval(), Duration::from_secs(2));
        t.record_failure();
        assert_eq!(t.next_interval(), Duration::from_secs(4));
        t.record_failure();
        assert_eq!(t.next_interval(), Duration::from_secs(8));
    }

    #[test]
    fn backoff_caps_at_max() {
        let mut t = tracker(100);
        for _ in 0..10 {
            t.record_failure();
        }
        // 1 → 2 → 4 → 8 → 16 → 32 → 60 → 60 ...
        assert_eq!(t.next_interval(), Duration::from_secs(60));
    }

    #[test]
    fn success_resets_failures_and_backoff() {
        let mut t = tracker(3);
        t.record_failure();
        t.record_failure();
        assert_eq!(t.next_interval(), Duration::from_secs(4));

        assert_eq!(t.record_success(), PollHealth::Healthy);
        assert_eq!(t.consecutive_failures(), 0);
        assert_eq!(t.next_interval(), Duration::from_secs(1));
    }

    #[test]
    fn degrades_at_threshold_and_recovers() {
        let mut t = tracker(3);
        t.record_success();

        assert_eq!(t.record_failure(), PollHealth::Healthy);
        assert_eq!(t.record_failure(), PollHealth::Healthy);
        assert_eq!(t.record_failure(), PollHealth::Degraded);
        assert_eq!(t.record_failure(), PollHealth::Degraded);

        assert_eq!(t.record_success(), PollHealth::Healthy);
    }

    #[test]
    fn failures_before_first_success_stay_unknown_until_threshold() {
        let mut t = tracker(2);
        assert_eq!(t.record_failure(), PollHealth::Unknown);
        assert_eq!(t.record_failure(), PollHealth::Degraded);
    }

    #[test]
    fn zero_threshold_never_degrades() {
        let mut t = tracker(0);
        t.record_success();
        for _ in 0..50 {
            assert_eq!(t.record_failure(), PollHealth::Healthy);
        }
    }

    #[test]
    fn max_backoff_below_interval_is_raised() {
        let mut t = FailureTracker::new(Duration::from_secs(10), Duration::from_secs(1), 0);
        t.record_failure();
        assert_eq!(t.next_interval(), Duration::from_secs(10));
    }
}
