//! Rate-limited backend execution: fixed spacing gate, per-attempt timeout and
//! exponential backoff retry with retry-after handling.

use crate::errors::{BackendError, CacheError};
use crate::utils::num::duration_ms;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Fixed-interval gate shared by every outbound call. Each caller reserves the next
/// free slot under the lock and sleeps outside it, so no two callers share a slot.
#[derive(Debug)]
pub struct RateGate {
    spacing: Duration,
    last_slot: Mutex<Option<Instant>>,
}

impl RateGate {
    #[must_use]
    pub const fn new(spacing: Duration) -> Self {
        Self { spacing, last_slot: Mutex::new(None) }
    }

    #[must_use]
    pub const fn spacing(&self) -> Duration {
        self.spacing
    }

    /// Reserves the next slot and returns it without waiting.
    pub fn reserve(&self) -> Instant {
        let now = Instant::now();
        let mut last = self.last_slot.lock();
        let slot = match *last {
            Some(prev) => (prev + self.spacing).max(now),
            None => now,
        };
        *last = Some(slot);
        slot
    }

    /// Waits for this caller's slot.
    pub async fn wait(&self) {
        let slot = self.reserve();
        let now = Instant::now();
        if slot > now {
            log::debug!("rate gate: waiting {:?} before next backend call", slot - now);
            tokio::time::sleep_until(slot).await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    pub timeout: Duration,
    /// Total attempts, including the first.
    pub retry_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff_base: Duration,
    /// Wait after a throttled response that carries no retry-after.
    pub throttle_default_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { backoff_base: Duration::from_secs(1), throttle_default_wait: Duration::from_secs(60) }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (0-based): `2^attempt x base`, unless the
    /// failure was a throttle, whose explicit wait replaces it.
    #[must_use]
    pub fn delay_after(&self, attempt: u32, err: &CacheError) -> Duration {
        if let CacheError::Backend(b) = err {
            if let Some(retry_after) = b.retry_after() {
                return retry_after.unwrap_or(self.throttle_default_wait);
            }
        }
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.backoff_base.checked_mul(factor).unwrap_or(Duration::MAX)
    }
}

#[derive(Default, Debug)]
struct ExecutorCounters {
    calls: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    timeouts: AtomicU64,
    throttled: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExecutorStats {
    pub calls: u64,
    pub attempts: u64,
    pub retries: u64,
    pub timeouts: u64,
    pub throttled: u64,
    pub failures: u64,
}

#[derive(Debug)]
pub struct RateLimitedExecutor {
    gate: RateGate,
    policy: RetryPolicy,
    counters: ExecutorCounters,
}

impl RateLimitedExecutor {
    #[must_use]
    pub fn new(spacing: Duration, policy: RetryPolicy) -> Self {
        Self { gate: RateGate::new(spacing), policy, counters: ExecutorCounters::default() }
    }

    #[must_use]
    pub const fn gate(&self) -> &RateGate {
        &self.gate
    }

    /// Runs `fetch` through the gate with timeout and retry. Attempts are sequential.
    pub async fn execute<T, F, Fut>(&self, mut fetch: F, opts: ExecuteOptions) -> Result<T, CacheError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        self.counters.calls.fetch_add(1, Ordering::Relaxed);
        let attempts = opts.retry_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            self.gate.wait().await;
            self.counters.attempts.fetch_add(1, Ordering::Relaxed);
            let err = match tokio::time::timeout(opts.timeout, fetch()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    if matches!(e, BackendError::Throttled { .. }) {
                        self.counters.throttled.fetch_add(1, Ordering::Relaxed);
                    }
                    CacheError::Backend(e)
                }
                Err(_) => {
                    self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                    CacheError::Timeout { timeout_ms: duration_ms(opts.timeout) }
                }
            };

            if !err.is_retryable() || attempt + 1 >= attempts {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                if err.is_retryable() {
                    log::warn!("backend call failed after {attempts} attempt(s): {err}");
                } else {
                    log::debug!("backend call failed with non-retryable error: {err}");
                }
                return Err(err);
            }

            let delay = self.policy.delay_after(attempt, &err);
            log::warn!("backend call attempt {} failed ({err}); retrying in {delay:?}", attempt + 1);
            self.counters.retries.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    #[must_use]
    pub fn stats(&self) -> ExecutorStats {
        let c = &self.counters;
        ExecutorStats {
            calls: c.calls.load(Ordering::Relaxed),
            attempts: c.attempts.load(Ordering::Relaxed),
            retries: c.retries.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
            throttled: c.throttled.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
        }
    }
}
