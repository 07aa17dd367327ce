//! Error taxonomy for outbound calls.

use crate::store::StorageError;
use thiserror::Error;

/// Errors returned by the outbound call pipeline.
///
/// Only [`CallError::Transport`] is retryable. A non-2xx response surfaces
/// as [`CallError::Status`] and is never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// Connectivity-level failure after retries were exhausted.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The dependency answered with a non-2xx status.
    #[error("error while calling {url} (status {status}): {message}")]
    Status {
        /// URL that was called.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Machine-readable code parsed from the error body, or the status
        /// code as text.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// The request payload could not be serialized.
    #[error("failed to serialize request payload: {0}")]
    Serialize(String),

    /// The 2xx response body could not be decoded into the caller's type.
    /// The network call itself succeeded.
    #[error("failed to decode response body: {0}")]
    Decode(String),

    /// An audit write required to continue failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The circuit breaker for this client is open; the call never reached
    /// the transport.
    #[error("circuit breaker is open for client {0}")]
    CircuitOpen(String),

    /// The composed URL is not valid.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl CallError {
    /// Whether this error came from the transport layer (and was therefore
    /// eligible for retry).
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// HTTP status code carried by the error, zero when there is none.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Status { status, .. } => *status,
            _ => 0,
        }
    }
}
