//! Storage trait seams.
//!
//! The toolkit does not care whether records live in SQL, a document store
//! or memory, only that inserts return the persisted record with its
//! generated id. Traits use explicit `Pin<Box<dyn Future>>` returns instead
//! of `async fn` so they can be consumed as `Arc<dyn …>`.

use crate::acknowledge::AcknowledgeRecord;
use crate::cache::{CachePolicy, ResponseCacheEntry};
use crate::call_log::{CallLog, Method};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from storage implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// No matching record. A normal negative result for cache and policy
    /// lookups.
    #[error("record not found")]
    NotFound,
    /// Connection or query failure.
    #[error("database error: {0}")]
    Database(String),
    /// Persisted value could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persistence for [`CallLog`] audit rows.
///
/// Implementations write outside the business transaction so call logs
/// survive a rollback.
pub trait CallLogStore: Send + Sync {
    /// Persist a new row, returning it with its generated id.
    fn insert(
        &self,
        log: CallLog,
    ) -> Pin<Box<dyn Future<Output = Result<CallLog, StorageError>> + Send + '_>>;

    /// Persist changes to an existing row.
    fn update(
        &self,
        log: CallLog,
    ) -> Pin<Box<dyn Future<Output = Result<CallLog, StorageError>> + Send + '_>>;

    /// Fetch a row by id.
    fn find_by_id(
        &self,
        id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<CallLog, StorageError>> + Send + '_>>;

    /// Remove a row. Provided for operational cleanup; the toolkit itself
    /// never deletes call logs.
    fn delete(
        &self,
        id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>>;
}

/// Persistence for the append-only acknowledge audit trail.
pub trait AcknowledgeStore: Send + Sync {
    /// Append a record, returning it with its generated id.
    fn insert(
        &self,
        record: AcknowledgeRecord,
    ) -> Pin<Box<dyn Future<Output = Result<AcknowledgeRecord, StorageError>> + Send + '_>>;

    /// All records for one call log id, oldest first.
    fn find_by_request(
        &self,
        request_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AcknowledgeRecord>, StorageError>> + Send + '_>>;
}

/// Persistence for cached responses.
pub trait ResponseCacheStore: Send + Sync {
    /// Fetch the entry for a cache key and method.
    ///
    /// With `freshness_minutes` set, only an entry with `last_accessed`
    /// within that window is returned; older entries yield
    /// [`StorageError::NotFound`].
    fn find_by_url(
        &self,
        url: String,
        method: Method,
        freshness_minutes: Option<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<ResponseCacheEntry, StorageError>> + Send + '_>>;

    /// Persist a new entry, returning it with its generated id.
    fn insert(
        &self,
        entry: ResponseCacheEntry,
    ) -> Pin<Box<dyn Future<Output = Result<ResponseCacheEntry, StorageError>> + Send + '_>>;

    /// Persist changes to an existing entry.
    fn update(
        &self,
        entry: ResponseCacheEntry,
    ) -> Pin<Box<dyn Future<Output = Result<ResponseCacheEntry, StorageError>> + Send + '_>>;

    /// Remove an entry.
    fn delete(
        &self,
        id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>>;
}

/// Persistence for cache eligibility policies.
pub trait CachePolicyStore: Send + Sync {
    /// Best-prefix-match policy for a URL and method, or
    /// [`StorageError::NotFound`].
    fn find_by_url(
        &self,
        url: String,
        method: Method,
    ) -> Pin<Box<dyn Future<Output = Result<CachePolicy, StorageError>> + Send + '_>>;

    /// Persist a new policy, returning it with its generated id.
    fn insert(
        &self,
        policy: CachePolicy,
    ) -> Pin<Box<dyn Future<Output = Result<CachePolicy, StorageError>> + Send + '_>>;
}
