// # Backoff Policies
//
// Policies map a number of failed attempts to the time to wait before the
// next attempt. They are pure and shared freely; the per-endpoint counter
// lives in `BackoffGenerator`.
//
// ## Variants
//
// - `ConstantBackoff`: the same interval every time
// - `LinearBackoff`: `min(step * n, max)`
// - `ExponentialBackoff`: `min(initial * 2^(n-1), max)`, 0 for n = 0

use std::time::Duration;

/// Maps a failed attempt count to a wait duration
///
/// Implementations must be deterministic and free of interior state so
/// they can be evaluated from any thread.
pub trait BackoffPolicy: Send + Sync {
    /// Time to wait after `failed_attempts` consecutive failures
    fn backoff_time(&self, failed_attempts: u32) -> Duration;
}

/// Owning handle to a policy
pub type BoxedBackoffPolicy = Box<dyn BackoffPolicy>;

/// Always waits the same amount of time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBackoff {
    interval: Duration,
}

impl ConstantBackoff {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl BackoffPolicy for ConstantBackoff {
    fn backoff_time(&self, _failed_attempts: u32) -> Duration {
        self.interval
    }
}

/// Waits `step` longer after each failure, up to `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    step: Duration,
    max: Duration,
}

impl LinearBackoff {
    pub fn new(step: Duration, max: Duration) -> Self {
        Self { step, max }
    }
}

impl BackoffPolicy for LinearBackoff {
    fn backoff_time(&self, failed_attempts: u32) -> Duration {
        self.step
            .checked_mul(failed_attempts)
            .map_or(self.max, |wait| wait.min(self.max))
    }
}

/// Doubles the wait after each failure, starting at `initial`, up to `max`
///
/// `backoff_time(0)` is zero. Generators always pre-increment, so the
/// zero case is never hit by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn backoff_time(&self, failed_attempts: u32) -> Duration {
        if failed_attempts == 0 || self.initial.is_zero() {
            return Duration::ZERO;
        }

        // 2^(n-1) overflows u32 from n = 33; anything that large is past max anyway
        2u32.checked_pow(failed_attempts - 1)
            .and_then(|factor| self.initial.checked_mul(factor))
            .map_or(self.max, |wait| wait.min(self.max))
    }
}

/// Stateful wrapper that walks a policy one failure at a time
///
/// The generator owns its policy outright. Each endpoint gets its own
/// generator, driven only from the manager's control thread.
pub struct BackoffGenerator {
    policy: BoxedBackoffPolicy,
    failures: u32,
}

impl BackoffGenerator {
    pub fn new(policy: BoxedBackoffPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Count one more failure and return the wait for it
    ///
    /// The first call after construction or [`reset`](Self::reset) returns
    /// `backoff_time(1)`.
    pub fn next_backoff(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.policy.backoff_time(self.failures)
    }

    /// Forget all counted failures
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Failures counted since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

impl std::fmt::Debug for BackoffGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackoffGenerator")
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}
