//! Failure de-duplication.
//!
//! One outage often shows up as a burst of faults (every reconnect attempt
//! fails immediately). Faults within the grace period of the last logged
//! failure are treated as the same outage and are not recorded again.

use std::time::Duration;
use tokio::time::Instant;

/// Window after a logged failure during which further faults are treated
/// as the same outage. Inclusive.
pub const DEFAULT_FAILURE_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Append-only history of logged failures for the monitor's lifetime.
#[derive(Debug, Clone)]
pub struct FailureTracker {
    grace_period: Duration,
    failures: Vec<Instant>,
}

impl FailureTracker {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            grace_period,
            failures: Vec::new(),
        }
    }

    /// Classify a failure observed at `now`, recording it if it is new.
    pub fn is_failure_new(&mut self, now: Instant) -> bool {
        if let Some(&last) = self.failures.last() {
            if now.saturating_duration_since(last) <= self.grace_period {
                return false;
            }
        }

        self.failures.push(now);
        true
    }

    /// Timestamps of every logged failure, oldest first.
    pub fn failures(&self) -> &[Instant] {
        &self.failures
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_GRACE_PERIOD)
    }
}
