//! Circuit breaker for failing fast against a struggling dependency.
//!
//! Failures are counted inside a rolling window. Once the count crosses the
//! threshold the circuit opens and calls are rejected without touching the
//! dependency. After `open_timeout` the circuit lets probe calls through in
//! half-open state; enough consecutive probe successes close it again, a
//! single probe failure reopens it.
//!
//! # States
//!
//! - **Closed**: calls pass through, failures inside the window are counted.
//! - **Open**: calls are rejected immediately for `open_timeout`.
//! - **HalfOpen**: limited probing to see whether the dependency recovered.
//!
//! # Example
//!
//! ```rust
//! use storefront_kit_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let config = CircuitBreakerConfig::builder()
//!     .failure_threshold(5)
//!     .open_timeout(Duration::from_secs(30))
//!     .build();
//!
//! let breaker = CircuitBreaker::new(config);
//!
//! match breaker.call(|| async { Ok::<_, String>(42) }).await {
//!     Ok(result) => println!("success: {result}"),
//!     Err(e) => println!("failed: {e}"),
//! }
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of failures inside the rolling window before opening.
    pub failure_threshold: usize,
    /// Rolling window for the failure count. A failure older than this no
    /// longer contributes toward the threshold.
    pub window: Duration,
    /// How long to reject calls before probing in half-open state.
    pub open_timeout: Duration,
    /// Consecutive probe successes needed to close the circuit again.
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(10),
            open_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub const fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder {
            failure_threshold: Some(5),
            window: Some(Duration::from_secs(10)),
            open_timeout: Some(Duration::from_secs(30)),
            success_threshold: Some(2),
        }
    }
}

/// Builder for [`CircuitBreakerConfig`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfigBuilder {
    failure_threshold: Option<usize>,
    window: Option<Duration>,
    open_timeout: Option<Duration>,
    success_threshold: Option<usize>,
}

impl CircuitBreakerConfigBuilder {
    /// Set the number of windowed failures that opens the circuit.
    #[must_use]
    pub const fn failure_threshold(mut self, threshold: usize) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    /// Set the rolling window for the failure count.
    #[must_use]
    pub const fn window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }

    /// Set how long the circuit stays open before probing.
    #[must_use]
    pub const fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = Some(timeout);
        self
    }

    /// Set the probe successes needed to close the circuit.
    #[must_use]
    pub const fn success_threshold(mut self, threshold: usize) -> Self {
        self.success_threshold = Some(threshold);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold.unwrap_or(5),
            window: self.window.unwrap_or(Duration::from_secs(10)),
            open_timeout: self.open_timeout.unwrap_or(Duration::from_secs(30)),
            success_threshold: self.success_threshold.unwrap_or(2),
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Calls pass through normally.
    Closed,
    /// Calls are rejected immediately.
    Open,
    /// Probing whether the dependency recovered.
    HalfOpen,
}

/// Errors from calls made through the circuit breaker.
#[derive(Error, Debug)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open and the call was rejected.
    #[error("circuit breaker is open")]
    Open,
    /// The operation itself failed.
    #[error(transparent)]
    Inner(E),
}

#[derive(Debug)]
struct BreakerState {
    state: State,
    failure_count: usize,
    success_count: usize,
    window_start: Option<Instant>,
    opened_at: Option<Instant>,
}

/// Tracks the health of one dependency and fails fast when it is down.
///
/// Cloning is cheap; clones share state, so one breaker instance can guard
/// all calls to the same dependency across tasks.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    state: Arc<RwLock<BreakerState>>,
    total_calls: Arc<AtomicU64>,
    total_successes: Arc<AtomicU64>,
    total_failures: Arc<AtomicU64>,
    total_rejections: Arc<AtomicU64>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(RwLock::new(BreakerState {
                state: State::Closed,
                failure_count: 0,
                success_count: 0,
                window_start: None,
                opened_at: None,
            })),
            total_calls: Arc::new(AtomicU64::new(0)),
            total_successes: Arc::new(AtomicU64::new(0)),
            total_failures: Arc::new(AtomicU64::new(0)),
            total_rejections: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current state of the circuit breaker.
    pub async fn state(&self) -> State {
        self.state.read().await.state
    }

    /// Call an operation through the circuit breaker.
    ///
    /// # Errors
    ///
    /// [`CircuitBreakerError::Open`] when the circuit rejects the call,
    /// [`CircuitBreakerError::Inner`] when the operation itself fails.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        if !self.can_attempt().await {
            self.total_rejections.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("circuit breaker is open, rejecting call");
            return Err(CircuitBreakerError::Open);
        }

        match operation().await {
            Ok(result) => {
                self.on_success().await;
                self.total_successes.fetch_add(1, Ordering::Relaxed);
                Ok(result)
            }
            Err(err) => {
                self.on_failure().await;
                self.total_failures.fetch_add(1, Ordering::Relaxed);
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    async fn can_attempt(&self) -> bool {
        let mut state = self.state.write().await;

        match state.state {
            State::Closed | State::HalfOpen => true,
            State::Open => {
                let expired = state
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.open_timeout);
                if expired {
                    tracing::info!("circuit breaker transitioning open -> half-open");
                    state.state = State::HalfOpen;
                    state.success_count = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    async fn on_success(&self) {
        let mut state = self.state.write().await;

        match state.state {
            State::Closed => {
                state.failure_count = 0;
                state.window_start = None;
            }
            State::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    tracing::info!(
                        successes = state.success_count,
                        "circuit breaker transitioning half-open -> closed"
                    );
                    state.state = State::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                    state.window_start = None;
                    state.opened_at = None;
                }
            }
            State::Open => {
                state.failure_count = 0;
            }
        }
    }

    async fn on_failure(&self) {
        let mut state = self.state.write().await;

        match state.state {
            State::Closed => {
                // Failures older than the window no longer count.
                let stale = state
                    .window_start
                    .is_some_and(|start| start.elapsed() >= self.config.window);
                if stale || state.window_start.is_none() {
                    state.failure_count = 0;
                    state.window_start = Some(Instant::now());
                }

                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        failures = state.failure_count,
                        threshold = self.config.failure_threshold,
                        "circuit breaker transitioning closed -> open"
                    );
                    state.state = State::Open;
                    state.opened_at = Some(Instant::now());
                }
            }
            State::HalfOpen => {
                tracing::warn!("circuit breaker transitioning half-open -> open, probe failed");
                state.state = State::Open;
                state.failure_count = 1;
                state.success_count = 0;
                state.opened_at = Some(Instant::now());
            }
            State::Open => {
                state.failure_count += 1;
            }
        }
    }

    /// Counters accumulated since the breaker was created.
    #[must_use]
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
        }
    }

    /// Force the circuit back to closed. For tests and manual intervention.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        tracing::info!("circuit breaker manually reset to closed");
        state.state = State::Closed;
        state.failure_count = 0;
        state.success_count = 0;
        state.window_start = None;
        state.opened_at = None;
    }
}

/// Counters for circuit breaker monitoring.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerMetrics {
    /// Total calls attempted.
    pub total_calls: u64,
    /// Total successful calls.
    pub total_successes: u64,
    /// Total failed calls.
    pub total_failures: u64,
    /// Total calls rejected while the circuit was open.
    pub total_rejections: u64,
}

impl CircuitBreakerMetrics {
    /// Success rate between 0.0 and 1.0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 1.0;
        }
        self.total_successes as f64 / self.total_calls as f64
    }

    /// Rejection rate between 0.0 and 1.0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rejection_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.total_rejections as f64 / self.total_calls as f64
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[tokio::test]
    async fn stays_closed_on_success() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());

        let result = breaker.call(|| async { Ok::<_, String>(42) }).await;

        assert!(result.is_ok());
        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn opens_after_windowed_failures() {
        let config = CircuitBreakerConfig::builder().failure_threshold(3).build();
        let breaker = CircuitBreaker::new(config);

        for _ in 0..3 {
            let _ = breaker.call(|| async { Err::<i32, _>("error") }).await;
        }

        assert_eq!(breaker.state().await, State::Open);
    }

    #[tokio::test]
    async fn rejects_while_open() {
        let config = CircuitBreakerConfig::builder().failure_threshold(2).build();
        let breaker = CircuitBreaker::new(config);

        for _ in 0..2 {
            let _ = breaker.call(|| async { Err::<i32, _>("error") }).await;
        }

        let result = breaker.call(|| async { Ok::<_, String>(42) }).await;

        assert!(matches!(result, Err(CircuitBreakerError::Open)));
    }

    #[tokio::test]
    async fn success_resets_the_failure_window() {
        let config = CircuitBreakerConfig::builder().failure_threshold(3).build();
        let breaker = CircuitBreaker::new(config);

        for _ in 0..2 {
            let _ = breaker.call(|| async { Err::<i32, _>("error") }).await;
        }
        let _ = breaker.call(|| async { Ok::<_, String>(42) }).await;
        for _ in 0..2 {
            let _ = breaker.call(|| async { Err::<i32, _>("error") }).await;
        }

        // Two failures, a success, then two more failures never reaches the
        // threshold of three.
        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn stale_failures_fall_out_of_the_window() {
        let config = CircuitBreakerConfig::builder()
            .failure_threshold(2)
            .window(Duration::from_millis(50))
            .build();
        let breaker = CircuitBreaker::new(config);

        let _ = breaker.call(|| async { Err::<i32, _>("error") }).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        let _ = breaker.call(|| async { Err::<i32, _>("error") }).await;

        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn probes_after_open_timeout() {
        let config = CircuitBreakerConfig::builder()
            .failure_threshold(2)
            .open_timeout(Duration::from_millis(100))
            .build();
        let breaker = CircuitBreaker::new(config);

        for _ in 0..2 {
            let _ = breaker.call(|| async { Err::<i32, _>("error") }).await;
        }
        assert_eq!(breaker.state().await, State::Open);

        tokio::time::sleep(Duration::from_millis(150)).await;

        let result = breaker.call(|| async { Ok::<_, String>(42) }).await;
        assert!(result.is_ok());

        let state = breaker.state().await;
        assert!(state == State::HalfOpen || state == State::Closed);
    }

    #[tokio::test]
    async fn closes_after_enough_probe_successes() {
        let config = CircuitBreakerConfig::builder()
            .failure_threshold(2)
            .open_timeout(Duration::from_millis(100))
            .success_threshold(2)
            .build();
        let breaker = CircuitBreaker::new(config);

        for _ in 0..2 {
            let _ = breaker.call(|| async { Err::<i32, _>("error") }).await;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        for _ in 0..2 {
            let _ = breaker.call(|| async { Ok::<_, String>(42) }).await;
        }

        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn reopens_when_a_probe_fails() {
        let config = CircuitBreakerConfig::builder()
            .failure_threshold(2)
            .open_timeout(Duration::from_millis(100))
            .build();
        let breaker = CircuitBreaker::new(config);

        for _ in 0..2 {
            let _ = breaker.call(|| async { Err::<i32, _>("error") }).await;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        let _ = breaker.call(|| async { Err::<i32, _>("error") }).await;

        assert_eq!(breaker.state().await, State::Open);
    }

    #[tokio::test]
    async fn counters_accumulate() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());

        for _ in 0..3 {
            let _ = breaker.call(|| async { Ok::<_, String>(42) }).await;
        }
        for _ in 0..2 {
            let _ = breaker.call(|| async { Err::<i32, _>("error") }).await;
        }

        let metrics = breaker.metrics();
        assert_eq!(metrics.total_calls, 5);
        assert_eq!(metrics.total_successes, 3);
        assert_eq!(metrics.total_failures, 2);
        assert!((metrics.success_rate() - 0.6).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn reset_closes_the_circuit() {
        let config = CircuitBreakerConfig::builder().failure_threshold(2).build();
        let breaker = CircuitBreaker::new(config);

        for _ in 0..2 {
            let _ = breaker.call(|| async { Err::<i32, _>("error") }).await;
        }
        assert_eq!(breaker.state().await, State::Open);

        breaker.reset().await;

        assert_eq!(breaker.state().await, State::Closed);
    }
}
