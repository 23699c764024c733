//! Bounded retry with exponential backoff
//!
//! Every external call (generation, embedding) goes through a `RetryPolicy`.
//! Once attempts are exhausted the last error is returned and the caller
//! switches to its local fallback.

use std::time::Duration;
use tracing::{debug, warn};

/// Default number of attempts (first try included)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Default ceiling on any single delay
pub const DEFAULT_MAX_DELAY_MS: u64 = 8_000;

/// Whether a failed attempt is worth repeating
pub trait Transient {
    /// True for network hiccups, timeouts and server-side errors
    fn is_transient(&self) -> bool;
}

/// Retry schedule: `base, 2*base, 4*base, ...` capped at `max_delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least 1
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound on any delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Set the attempt count
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the base delay
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Longest `run` can take when every attempt is cut off at `per_attempt`
    pub fn budget(&self, per_attempt: Duration) -> Duration {
        let attempts = self.max_attempts.max(1);
        let waits = (1..attempts).fold(Duration::ZERO, |total, attempt| {
            total.saturating_add(self.delay_after(attempt))
        });
        per_attempt.saturating_mul(attempts).saturating_add(waits)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    ///
    /// `op` receives the 1-based attempt number.
    pub fn run<T, E, F>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Transient + std::fmt::Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", what, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        what, attempt, attempts, e, delay
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => {
                    warn!("{} failed after {} attempt(s): {}", what, attempt, e);
                    return Err(e);
                }
            }
        }
    }
}
