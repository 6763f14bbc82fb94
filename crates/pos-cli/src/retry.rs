//! Exponential back-off for read-only requests that never reached the server.
//!
//! Destructive operations do not go through here: the invoker sends them at
//! most once.

use std::time::Duration;

use tokio::time::Instant;

/// Back-off state for one read-only invocation.
///
/// Each `next_wait` doubles the wait (capped at `max_wait`) and returns
/// `None` once `max_attempts` is reached or the time budget is spent. The
/// budget runs on the tokio clock, the same one the invoker sleeps on.
pub struct ExponentialBackoff {
    max_wait: Duration,
    total_budget: Duration,
    current_wait: Duration,
    max_attempts: u32,
    attempts: u32,
    start: Instant,
}

impl ExponentialBackoff {
    /// `max_attempts` counts the first try, so `1` never waits.
    pub fn new(init_wait: Duration, max_wait: Duration, total_budget: Duration, max_attempts: u32) -> Self {
        Self {
            max_wait,
            total_budget,
            current_wait: init_wait,
            max_attempts: max_attempts.max(1),
            attempts: 1,
            start: Instant::now(),
        }
    }

    /// Wait before the next attempt, or `None` when out of attempts or time.
    pub fn next_wait(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        let elapsed = self.start.elapsed();
        if elapsed >= self.total_budget {
            return None;
        }

        let wait = self.current_wait;
        self.current_wait = self.current_wait.saturating_mul(2).min(self.max_wait);
        self.attempts += 1;

        let remaining = self.total_budget.saturating_sub(elapsed);
        Some(wait.min(remaining))
    }

    /// Attempts made or granted so far, the first included.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
