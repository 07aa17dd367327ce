//! The wire seam.
//!
//! A [`Transport`] performs exactly one HTTP exchange. Retry, audit logging,
//! caching and acknowledgment all live above this seam in the outbound
//! client, so tests can script a transport without touching the network.

use crate::call_log::Method;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// A completed HTTP exchange.
///
/// Note that a non-2xx status is a *successful* transport result; mapping
/// status codes to errors is the client's job and is never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

/// A connectivity-level failure: DNS, TCP, TLS, timeout, or a body that
/// could not be read. These are the only retryable errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// Performs one HTTP call.
pub trait Transport: Send + Sync {
    /// Dispatch a single request and read the full response body.
    fn send(
        &self,
        method: Method,
        url: String,
        headers: Vec<(String, String)>,
        body: Option<Vec<u8>>,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + '_>>;
}

impl TransportResponse {
    /// Whether the status code is in the 2xx range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}
