//! Retry policy: decides whether a failed task runs again, and when.

use std::time::Duration;

/// Retry policy for failed tasks.
///
/// A task may run `max_retries + 1` times in total. After the n-th failure
/// (n = retries so far, 1-indexed) the next attempt is delayed by
/// `base_delay * multiplier^(n - 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

/// What happens to a task after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// Run again after the given delay.
    RetryAfter(Duration),

    /// Retry budget exhausted.
    GiveUp,
}

impl RetryPolicy {
    /// Decide based on the number of failures recorded so far (already
    /// incremented for the attempt that just failed).
    pub fn decide(&self, retries: u32) -> RetryDecision {
        if retries > self.max_retries {
            RetryDecision::GiveUp
        } else {
            RetryDecision::RetryAfter(self.next_delay(retries))
        }
    }

    /// Backoff delay after the `retries`-th failure.
    ///
    /// Example with base_delay=5s, multiplier=2.0:
    /// - retry 1: 5s
    /// - retry 2: 10s
    /// - retry 3: 20s
    pub fn next_delay(&self, retries: u32) -> Duration {
        let exponent = retries.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}
