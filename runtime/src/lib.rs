//! Resilience runtime for storefront-kit.
//!
//! Two building blocks used by the outbound HTTP client:
//!
//! - [`retry`]: exponential backoff with jitter for transient transport
//!   failures.
//! - [`circuit_breaker`]: per-dependency circuit breaking so a struggling
//!   dependency fails fast instead of queueing callers.
//!
//! Both are generic over the operation and the error type and carry no HTTP
//! knowledge; the client crate decides which errors count as transient.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerMetrics, State,
};
pub use retry::{RetryPolicy, retry_with_backoff, retry_with_predicate};
