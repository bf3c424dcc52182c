//! Retry policy with exponential backoff.

use std::time::Duration;

/// Upper bound for any single retry delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_millis(30_000);

/// Retry ceiling and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(1000),
        }
    }
}

/// What to do after a failed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule exactly one retry after the delay.
    Retry(Duration),
    /// Ceiling reached; persist and wait for a new capture.
    Exhausted,
}

/// Computes the backoff delay for the given retry number.
///
/// `delay = min(30s, base * 2^(retry_count - 1))`. Retry counts of zero or
/// less map to no delay.
///
/// | retry | base = 1s |
/// |-------|-----------|
/// | 1     | 1s        |
/// | 2     | 2s        |
/// | 3     | 4s        |
/// | 4     | 8s        |
/// | 5     | 16s       |
/// | 6+    | 30s (cap) |
pub fn backoff_delay(retry_count: u32, base: Duration) -> Duration {
    if retry_count == 0 {
        return Duration::ZERO;
    }

    let base_ms = base.as_millis().min(u64::MAX as u128) as u64;
    let max_ms = MAX_RETRY_DELAY.as_millis() as u64;
    let shift = retry_count - 1;
    let multiplier = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(multiplier).min(max_ms);

    Duration::from_millis(delay_ms)
}

/// Tracks consecutive failures for the current burst.
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
    retry_count: u32,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            retry_count: 0,
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Record a failed send and decide whether to retry.
    pub fn on_failure(&mut self) -> RetryDecision {
        self.retry_count = self.retry_count.saturating_add(1);
        if self.retry_count > self.policy.max_retries {
            return RetryDecision::Exhausted;
        }
        RetryDecision::Retry(backoff_delay(self.retry_count, self.policy.base_delay))
    }

    /// Start a fresh retry budget.
    pub fn reset(&mut self) {
        self.retry_count = 0;
    }
}
