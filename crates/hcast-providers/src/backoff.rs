//! Deterministic exponential backoff.
//!
//! Used for submission-time concurrency limiting and transient submit
//! retries. Never applied to the steady-state poll interval, which stays
//! fixed. Delays are a pure function of (attempt, base, ceiling) so tests
//! never need to sleep.

use std::time::Duration;

/// Backoff policy: exponential growth from `base`, capped at `ceiling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub ceiling: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        Self { base, ceiling }
    }

    /// Delay for a given zero-based attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.ceiling)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            ceiling: Duration::from_secs(60),
        }
    }
}

/// Cursor over a policy, owned by one in-flight submit loop.
///
/// Reset only at the start of a new top-level request: a fresh `Backoff` is
/// constructed per request and never shared.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay to wait before the next retry; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Number of delays handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}
