//! Acknowledge protocol types and the hook seam used by the transaction
//! manager.
//!
//! Every outbound call that asks for acknowledgment is re-notified with the
//! final decision of the logical transaction it was made in: `commit` when
//! the local database transaction committed, `rollback` otherwise. The wire
//! convention is a re-invocation of the original endpoint with `?s=<status>`
//! appended, same method and body.

use crate::error::CallError;
use crate::payload::Metadata;
use crate::scope::RequestScope;
use crate::store::StorageError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// The final decision of a logical transaction.
///
/// This is deliberately a two-state type: `on_progress` is not a decision,
/// it is the absence of one (see [`CommitStatus`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The local database transaction committed.
    Commit,
    /// The local database transaction rolled back.
    Rollback,
}

impl Decision {
    /// Wire representation, used both as the `?s=` query value and as the
    /// persisted status string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Rollback => "rollback",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Decision> for crate::call_log::CallStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Commit => Self::Commit,
            Decision::Rollback => Self::Rollback,
        }
    }
}

/// Commit status of an acknowledge audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    /// The call was made and awaits the transaction's decision.
    OnProgress,
    /// The transaction committed.
    Commit,
    /// The transaction rolled back.
    Rollback,
}

impl CommitStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OnProgress => "on_progress",
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
            "on_progress" => Ok(Self::OnProgress),
            "commit" => Ok(Self::Commit),
            "rollback" => Ok(Self::Rollback),
            _ => Err(StorageError::Database(format!(
                "invalid commit status: {s}"
            ))),
        }
    }
}

impl From<Decision> for CommitStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Commit => Self::Commit,
            Decision::Rollback => Self::Rollback,
        }
    }
}

/// Append-only audit record of a commit/rollback decision for one outbound
/// call.
///
/// An `on_progress` row is written when the call registers for
/// acknowledgment; the final decision is a *new* row written at broadcast
/// time. Rows are never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct AcknowledgeRecord {
    /// Generated row id.
    pub id: i64,
    /// The [`crate::call_log::CallLog`] id this record belongs to.
    pub request_id: i64,
    /// Where the decision stands.
    pub commit_status: CommitStatus,
    /// The original request payload view, kept so the reservation can be
    /// replayed or audited.
    pub reserved_holder: Metadata,
    /// Short type name of the original payload.
    pub reserved_holder_name: String,
    /// Free-form context, typically the error that caused a rollback.
    pub message: String,
}

/// Seam between the transaction manager and the acknowledge subsystem.
///
/// Uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn` to
/// enable trait object usage (`Arc<dyn AcknowledgeHook>`).
pub trait AcknowledgeHook: Send + Sync {
    /// Write the bootstrap call-log row for the inbound request described by
    /// `scope` and stash its id as the scope's reference id.
    ///
    /// # Errors
    ///
    /// Returns [`CallError`] when the bootstrap row cannot be written. The
    /// transaction manager treats this as best-effort.
    fn prepare<'a>(
        &'a self,
        scope: &'a RequestScope,
    ) -> Pin<Box<dyn Future<Output = Result<(), CallError>> + Send + 'a>>;

    /// Broadcast `decision` to every pending call registered in `scope` and
    /// finalize the bootstrap row.
    ///
    /// # Errors
    ///
    /// Returns the first broadcast failure (fail-fast); earlier broadcasts
    /// are not undone.
    fn acknowledge<'a>(
        &'a self,
        scope: &'a RequestScope,
        decision: Decision,
        message: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), CallError>> + Send + 'a>>;
}
