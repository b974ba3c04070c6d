use chrono::{DateTime, Duration, Utc};

use crate::traits::CallbackJobUpdate;

/// Delays, in seconds, before each attempt of a delivery sequence. Attempt `n` is due `RETRY_DELAYS_SECS[n-1]` after
/// the previous attempt, or after the sequence was queued for the first attempt.
pub const RETRY_DELAYS_SECS: [i64; 5] = [5, 30, 60, 300, 1800];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule {
    delays: Vec<Duration>,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self { delays: RETRY_DELAYS_SECS.iter().map(|s| Duration::seconds(*s)).collect() }
    }
}

impl RetrySchedule {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// The attempt budget of a delivery sequence
    pub fn max_attempts(&self) -> i64 {
        self.delays.len() as i64
    }

    /// The delay before the 1-based `attempt`, or `None` if the attempt is outside the budget.
    pub fn delay_before(&self, attempt: i64) -> Option<Duration> {
        let idx = usize::try_from(attempt.checked_sub(1)?).ok()?;
        self.delays.get(idx).copied()
    }

    /// When the first attempt of a sequence queued at `queued_at` falls due.
    pub fn first_attempt_at(&self, queued_at: DateTime<Utc>) -> DateTime<Utc> {
        queued_at + self.delay_before(1).unwrap_or_else(Duration::zero)
    }

    /// What happens to a job after its `attempt`-th attempt, made at `now`, failed.
    pub fn after_failure(&self, attempt: i64, now: DateTime<Utc>) -> CallbackJobUpdate {
        match self.delay_before(attempt + 1) {
            Some(delay) => CallbackJobUpdate::RetryAt(now + delay),
            None => CallbackJobUpdate::Failed,
        }
    }
}
