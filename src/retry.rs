//! Retry policy with exponential backoff
//!
//! A [`RetryPolicy`] answers two questions for the request executor: how long to
//! wait before attempt `n`, and whether an HTTP status is worth retrying at all.
//! [`retry_with_policy`] drives an async operation through that policy.
//!
//! # Examples
//!
//! ```rust
//! use open_responder::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! # fn example() -> open_responder::Result<()> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(5)
//!     .initial_delay(Duration::from_millis(500))
//!     .max_delay(Duration::from_secs(10))
//!     .multiplier(1.5)
//!     .build()?;
//!
//! assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
//! assert!(policy.is_retryable(503));
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Status codes retried by default: rate limiting, transient server faults and overload.
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 6] = [429, 500, 502, 503, 504, 529];

/// Immutable description of how failed requests are retried
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_factor: f64,
    retryable_status_codes: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.0,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy, validating every field.
    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    ) -> Result<Self> {
        Self::builder()
            .max_retries(max_retries)
            .initial_delay(initial_delay)
            .max_delay(max_delay)
            .multiplier(multiplier)
            .build()
    }

    /// The default policy: 3 retries, 1s initial delay, 30s cap, doubling.
    pub fn defaults() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn jitter_factor(&self) -> f64 {
        self.jitter_factor
    }

    pub fn retryable_status_codes(&self) -> &BTreeSet<u16> {
        &self.retryable_status_codes
    }

    /// Delay before attempt `attempt` (1-based), without jitter.
    ///
    /// Attempts below 1 get the initial delay. The result never exceeds
    /// `max_delay` and never decreases as `attempt` grows.
    pub fn delay_for_attempt(&self, attempt: i32) -> Duration {
        if attempt < 1 {
            return self.initial_delay;
        }

        let cap = self.max_delay.as_secs_f64();
        let exponential = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt - 1);

        // powi overflows to infinity long before attempts run out
        if !exponential.is_finite() || exponential >= cap {
            return self.max_delay;
        }
        Duration::from_secs_f64(exponential)
    }

    /// Whether an HTTP status code is in the retryable set.
    pub fn is_retryable(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    /// Whether the executor should retry after `error`.
    ///
    /// Errors carrying an HTTP status are decided by the status set. Errors
    /// without one (network failures, parse failures) use their own flag.
    pub fn should_retry(&self, error: &Error) -> bool {
        match error.status() {
            Some(status) => self.is_retryable(status),
            None => error.is_retryable(),
        }
    }

    /// Actual sleep before attempt `attempt`.
    ///
    /// Applies jitter when configured and honours a server `Retry-After` hint that
    /// asks for a longer wait, still capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: i32, retry_after: Option<Duration>) -> Duration {
        let mut delay = self.delay_for_attempt(attempt);

        if self.jitter_factor > 0.0 {
            let base = delay.as_secs_f64();
            let range = base * self.jitter_factor;
            let jittered = base + rand::random::<f64>() * range - range / 2.0;
            delay = Duration::from_secs_f64(jittered.clamp(0.0, self.max_delay.as_secs_f64()));
        }

        match retry_after {
            Some(hint) if hint > delay => hint.min(self.max_delay),
            _ => delay,
        }
    }
}

/// Builder for [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_factor: f64,
    retryable_status_codes: Option<BTreeSet<u16>>,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        let defaults = RetryPolicy::default();
        Self {
            max_retries: defaults.max_retries,
            initial_delay: defaults.initial_delay,
            max_delay: defaults.max_delay,
            multiplier: defaults.multiplier,
            jitter_factor: defaults.jitter_factor,
            retryable_status_codes: None,
        }
    }
}

impl RetryPolicyBuilder {
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Randomise each delay by up to this fraction (0.0 to 1.0)
    pub fn jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter;
        self
    }

    /// Replace the retryable status set
    pub fn retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = Some(codes.into_iter().collect());
        self
    }

    pub fn build(self) -> Result<RetryPolicy> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::config(format!(
                "retry multiplier must be a finite number >= 1.0, got {}",
                self.multiplier
            )));
        }

        if self.max_delay < self.initial_delay {
            return Err(Error::config(format!(
                "max_delay ({:?}) must not be smaller than initial_delay ({:?})",
                self.max_delay, self.initial_delay
            )));
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(Error::config(format!(
                "jitter_factor must be between 0.0 and 1.0, got {}",
                self.jitter_factor
            )));
        }

        Ok(RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
            jitter_factor: self.jitter_factor,
            retryable_status_codes: self
                .retryable_status_codes
                .unwrap_or_else(|| DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect()),
        })
    }
}

/// Result of [`retry_with_policy`] together with the number of attempts made
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T>,
    pub attempts: u32,
}

impl<T> RetryOutcome<T> {
    pub fn into_result(self) -> Result<T> {
        self.result
    }
}

/// Retry an async operation according to `policy`
///
/// The operation receives the 1-based attempt number. A failure is retried only
/// when [`RetryPolicy::should_retry`] allows it and fewer than `max_retries`
/// retries have happened, so at most `max_retries + 1` attempts are made. The
/// last error is returned unchanged.
///
/// # Examples
///
/// ```rust,no_run
/// use open_responder::retry::{retry_with_policy, RetryPolicy};
///
/// # async fn example() -> open_responder::Result<()> {
/// let outcome = retry_with_policy(&RetryPolicy::defaults(), |attempt| async move {
///     log::debug!("attempt {}", attempt);
///     Ok::<_, open_responder::Error>(42)
/// })
/// .await;
///
/// assert_eq!(outcome.attempts, 1);
/// assert_eq!(outcome.into_result()?, 42);
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_policy<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(err) => {
                if attempt > policy.max_retries() || !policy.should_retry(&err) {
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt,
                    };
                }

                let attempt_index = i32::try_from(attempt).unwrap_or(i32::MAX);
                let delay = policy.backoff_delay(attempt_index, err.retry_after());
                log::warn!(
                    "Attempt {}/{} failed ({}), retrying in {:?}",
                    attempt,
                    policy.max_retries() + 1,
                    err,
                    delay
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
