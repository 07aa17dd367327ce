//! Retry with exponential backoff and jitter.
//!
//! Transient transport failures are retried with a delay that grows as
//! `min_delay + min_delay * 2^attempt`, capped at `max_delay`. A random
//! jitter of up to a quarter of the delay is subtracted to spread out
//! synchronized retries, and the result never drops below `min_delay`.
//!
//! # Example
//!
//! ```rust
//! use storefront_kit_runtime::retry::{RetryPolicy, retry_with_backoff};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(3)
//!     .min_delay(Duration::from_millis(500))
//!     .max_delay(Duration::from_secs(5))
//!     .build();
//!
//! let result = retry_with_backoff(policy, || async {
//!     Ok::<_, String>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration.
///
/// # Default Values
///
/// - `max_retries`: 3 (so up to 4 attempts in total)
/// - `min_delay`: 500ms
/// - `max_delay`: 5 seconds
/// - `normal_sleep`: false
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: usize,
    /// Smallest delay between attempts, and the floor after jitter.
    pub min_delay: Duration,
    /// Cap for the exponential delay.
    pub max_delay: Duration,
    /// Skip delays entirely. Meant for tests and local runs where waiting
    /// on backoff is pure overhead.
    pub normal_sleep: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            normal_sleep: false,
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: Some(3),
            min_delay: Some(Duration::from_millis(500)),
            max_delay: Some(Duration::from_secs(5)),
            normal_sleep: Some(false),
        }
    }

    /// Deterministic delay for a retry attempt, before jitter.
    ///
    /// `min_delay + min_delay * 2^attempt`, capped at `max_delay`. Zero when
    /// `normal_sleep` is set.
    #[must_use]
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.normal_sleep {
            return Duration::ZERO;
        }

        let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let delay = self
            .min_delay
            .saturating_add(self.min_delay.saturating_mul(factor));

        if delay > self.max_delay {
            self.max_delay
        } else {
            delay
        }
    }

    /// Delay for a retry attempt with jitter applied.
    ///
    /// Subtracts a random amount of up to a quarter of the base delay, then
    /// floors the result at `min_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for_attempt(attempt);

        let quarter = u64::try_from(delay.as_millis() / 4).unwrap_or(u64::MAX);
        if quarter == 0 {
            return delay;
        }

        let jitter = rand::thread_rng().gen_range(0..quarter);
        let jittered = delay.saturating_sub(Duration::from_millis(jitter));

        if jittered < self.min_delay {
            self.min_delay
        } else {
            jittered
        }
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<usize>,
    min_delay: Option<Duration>,
    max_delay: Option<Duration>,
    normal_sleep: Option<bool>,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries after the first attempt.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set the smallest delay between attempts.
    #[must_use]
    pub const fn min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = Some(delay);
        self
    }

    /// Set the cap for the exponential delay.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Skip backoff delays entirely.
    #[must_use]
    pub const fn normal_sleep(mut self, normal_sleep: bool) -> Self {
        self.normal_sleep = Some(normal_sleep);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(3),
            min_delay: self.min_delay.unwrap_or(Duration::from_millis(500)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(5)),
            normal_sleep: self.normal_sleep.unwrap_or(false),
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// Every error is treated as retryable. Use [`retry_with_predicate`] when
/// only some errors should trigger a retry.
///
/// # Errors
///
/// Returns the final error once `max_retries` is exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(policy: RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_predicate(policy, operation, |_| true).await
}

/// Retry an async operation, consulting a predicate before each retry.
///
/// An error the predicate rejects is returned immediately without sleeping.
///
/// # Errors
///
/// Returns the first non-retryable error, or the final error once
/// `max_retries` is exhausted.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempt, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    return Err(err);
                }

                if attempt as usize >= policy.max_retries {
                    tracing::error!(
                        attempt,
                        error = %err,
                        "operation failed after max retries"
                    );
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "operation failed, retrying"
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn base_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.base_delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(policy.base_delay_for_attempt(1), Duration::from_millis(1500));
        assert_eq!(policy.base_delay_for_attempt(2), Duration::from_millis(2500));
        assert_eq!(policy.base_delay_for_attempt(3), Duration::from_millis(4500));
        assert_eq!(policy.base_delay_for_attempt(4), Duration::from_millis(5000));
        assert_eq!(policy.base_delay_for_attempt(10), Duration::from_millis(5000));
    }

    #[test]
    fn normal_sleep_zeroes_all_delays() {
        let policy = RetryPolicy::builder().normal_sleep(true).build();

        for attempt in 0..8 {
            assert_eq!(policy.delay_for_attempt(attempt), Duration::ZERO);
        }
    }

    proptest! {
        #[test]
        fn jittered_delay_stays_within_bounds(attempt in 0_u32..16) {
            let policy = RetryPolicy::default();
            let base = policy.base_delay_for_attempt(attempt);
            let delay = policy.delay_for_attempt(attempt);

            prop_assert!(delay >= policy.min_delay);
            prop_assert!(delay <= base);
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_try_without_retrying() {
        let policy = RetryPolicy::default();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = retry_with_backoff(policy, || {
            let c = Arc::clone(&counter_clone);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(42)
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let policy = RetryPolicy::builder()
            .max_retries(3)
            .normal_sleep(true)
            .build();

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = retry_with_backoff(policy, || {
            let c = Arc::clone(&counter_clone);
            async move {
                let attempt = c.fetch_add(1, Ordering::SeqCst);
                if attempt < 2 {
                    Err(format!("attempt {attempt} failed"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_retries_and_returns_last_error() {
        let policy = RetryPolicy::builder()
            .max_retries(3)
            .normal_sleep(true)
            .build();

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = retry_with_backoff(policy, || {
            let c = Arc::clone(&counter_clone);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>("connection refused")
            }
        })
        .await;

        assert!(result.is_err());
        // max_retries of 3 means 4 attempts in total.
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn predicate_rejects_non_retryable_errors_immediately() {
        let policy = RetryPolicy::builder().normal_sleep(true).build();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = retry_with_predicate(
            policy,
            || {
                let c = Arc::clone(&counter_clone);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>("status 422")
                }
            },
            |err: &&str| err.contains("transport"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
