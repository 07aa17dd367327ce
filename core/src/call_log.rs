//! Outbound call audit records.

use crate::payload::Metadata;
use crate::store::StorageError;
use std::fmt;

/// HTTP method of an outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Idempotent read; never audited, never acknowledged.
    Get,
    /// Create.
    Post,
    /// Replace.
    Put,
    /// Partial update.
    Patch,
    /// Delete.
    Delete,
}

impl Method {
    /// Wire/database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether this is a GET. GETs skip call logging and acknowledgment.
    #[must_use]
    pub const fn is_get(self) -> bool {
        matches!(self, Self::Get)
    }

    /// Parse from the database representation.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] for an unknown method string.
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        match s {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(StorageError::Database(format!("invalid method: {s}"))),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a call log row.
///
/// Outbound calls go `calling → success | failed`. The bootstrap row written
/// for the inbound request starts at `called` and is finalized to the
/// transaction decision (`commit` or `rollback`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    /// Inbound bootstrap row: the request was received.
    Called,
    /// Outbound call dispatched, no terminal state yet.
    Calling,
    /// Outbound call completed with a 2xx.
    Success,
    /// Outbound call failed (transport error or non-2xx).
    Failed,
    /// Logical transaction committed (bootstrap row only).
    Commit,
    /// Logical transaction rolled back (bootstrap row only).
    Rollback,
}

impl CallStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Called => "called",
            Self::Calling => "calling",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
        }
    }

    /// Parse from the database string.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] for an unknown status string.
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        match s {
            "called" => Ok(Self::Called),
            "calling" => Ok(Self::Calling),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "commit" => Ok(Self::Commit),
            "rollback" => Ok(Self::Rollback),
            _ => Err(StorageError::Database(format!("invalid call status: {s}"))),
        }
    }
}

/// Audit record of one outbound HTTP call.
///
/// Created in state [`CallStatus::Calling`] before the request is dispatched
/// (so failures are observable even on crash) and mutated exactly once to a
/// terminal state when the call completes. `reference_id` links back to the
/// bootstrap row of the logical transaction that triggered the call, forming
/// the chain "inbound request → N outbound calls".
#[derive(Debug, Clone, PartialEq)]
pub struct CallLog {
    /// Generated row id.
    pub id: i64,
    /// Identity that issued the call (see [`crate::scope::Actor`]).
    pub client_id: i64,
    /// Identity kind: `User`, `Customer`, `Client` or `System`.
    pub client_type: String,
    /// External transaction id parsed from the response body (`{"id": …}`),
    /// zero when absent.
    pub transaction_id: i64,
    /// HTTP method.
    pub method: Method,
    /// Full URL that was called.
    pub url: String,
    /// Rendered request headers, for audit only.
    pub header: String,
    /// Request body view.
    pub request: Metadata,
    /// Lifecycle status.
    pub status: CallStatus,
    /// HTTP status code of the response, zero before completion.
    pub http_status_code: u16,
    /// Bootstrap row id of the logical transaction this call belongs to.
    pub reference_id: i64,
}
