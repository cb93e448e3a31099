//! Bounded exponential backoff for transport failures of a batch chunk.

use std::time::Duration;

/// How many times a failed chunk is re-sent, and how long to wait in between.
///
/// Only transport failures (network, timeout) are retried; node-side RPC
/// errors fail the fetch immediately.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Fail on the first transport error.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Doubling backoff starting at `initial_backoff`, capped at 10s.
    pub fn exponential(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff: Duration::from_secs(10),
        }
    }

    /// Delay before the `attempt`-th retry (1-based), or `None` once the
    /// budget is spent.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        Some(
            self.initial_backoff
                .saturating_mul(factor)
                .min(self.max_backoff),
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_never_retries() {
        assert_eq!(RetryPolicy::none().next_delay(1), None);
    }

    #[test]
    fn delays_double_until_budget_spent() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(500));
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(500)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(1000)));
        assert_eq!(policy.next_delay(3), Some(Duration::from_millis(2000)));
        assert_eq!(policy.next_delay(4), None);
    }

    #[test]
    fn delay_capped_at_max() {
        let policy = RetryPolicy::exponential(10, Duration::from_secs(1));
        assert_eq!(policy.next_delay(9), Some(Duration::from_secs(10)));
    }
}
