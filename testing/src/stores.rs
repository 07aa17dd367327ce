//! In-memory implementations of the storage traits.
//!
//! Rows live in mutex-guarded vectors with generated ids. Locks are released
//! before any await point; each method is a single synchronous critical
//! section wrapped in an immediately-ready future.

use chrono::{Duration, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use storefront_kit_core::acknowledge::AcknowledgeRecord;
use storefront_kit_core::cache::{CachePolicy, ResponseCacheEntry};
use storefront_kit_core::call_log::{CallLog, Method};
use storefront_kit_core::store::{
    AcknowledgeStore, CachePolicyStore, CallLogStore, ResponseCacheStore, StorageError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Memory-backed [`CallLogStore`].
#[derive(Debug, Default)]
pub struct MemoryCallLogStore {
    rows: Mutex<Vec<CallLog>>,
    next_id: AtomicI64,
}

impl MemoryCallLogStore {
    /// Number of stored rows.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all rows, insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CallLog> {
        lock(&self.rows).clone()
    }
}

impl CallLogStore for MemoryCallLogStore {
    fn insert(
        &self,
        mut log: CallLog,
    ) -> Pin<Box<dyn Future<Output = Result<CallLog, StorageError>> + Send + '_>> {
        Box::pin(async move {
            log.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            lock(&self.rows).push(log.clone());
            Ok(log)
        })
    }

    fn update(
        &self,
        log: CallLog,
    ) -> Pin<Box<dyn Future<Output = Result<CallLog, StorageError>> + Send + '_>> {
        Box::pin(async move {
            let mut rows = lock(&self.rows);
            let row = rows
                .iter_mut()
                .find(|r| r.id == log.id)
                .ok_or(StorageError::NotFound)?;
            *row = log.clone();
            Ok(log)
        })
    }

    fn find_by_id(
        &self,
        id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<CallLog, StorageError>> + Send + '_>> {
        Box::pin(async move {
            lock(&self.rows)
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or(StorageError::NotFound)
        })
    }

    fn delete(
        &self,
        id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
        Box::pin(async move {
            let mut rows = lock(&self.rows);
            let before = rows.len();
            rows.retain(|r| r.id != id);
            if rows.len() == before {
                return Err(StorageError::NotFound);
            }
            Ok(())
        })
    }
}

/// Memory-backed [`AcknowledgeStore`].
#[derive(Debug, Default)]
pub struct MemoryAcknowledgeStore {
    rows: Mutex<Vec<AcknowledgeRecord>>,
    next_id: AtomicI64,
}

impl MemoryAcknowledgeStore {
    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all records, insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<AcknowledgeRecord> {
        lock(&self.rows).clone()
    }
}

impl AcknowledgeStore for MemoryAcknowledgeStore {
    fn insert(
        &self,
        mut record: AcknowledgeRecord,
    ) -> Pin<Box<dyn Future<Output = Result<AcknowledgeRecord, StorageError>> + Send + '_>> {
        Box::pin(async move {
            record.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            lock(&self.rows).push(record.clone());
            Ok(record)
        })
    }

    fn find_by_request(
        &self,
        request_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AcknowledgeRecord>, StorageError>> + Send + '_>>
    {
        Box::pin(async move {
            Ok(lock(&self.rows)
                .iter()
                .filter(|r| r.request_id == request_id)
                .cloned()
                .collect())
        })
    }
}

/// Memory-backed [`ResponseCacheStore`].
#[derive(Debug, Default)]
pub struct MemoryResponseCacheStore {
    rows: Mutex<Vec<ResponseCacheEntry>>,
    next_id: AtomicI64,
}

impl MemoryResponseCacheStore {
    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backdate an entry's `last_accessed`, for staleness tests.
    pub fn age_entry(&self, id: i64, minutes: i64) {
        let mut rows = lock(&self.rows);
        if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
            row.last_accessed -= Duration::minutes(minutes);
        }
    }

    /// Copy of all entries, insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ResponseCacheEntry> {
        lock(&self.rows).clone()
    }
}

impl ResponseCacheStore for MemoryResponseCacheStore {
    fn find_by_url(
        &self,
        url: String,
        method: Method,
        freshness_minutes: Option<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<ResponseCacheEntry, StorageError>> + Send + '_>> {
        Box::pin(async move {
            let entry = lock(&self.rows)
                .iter()
                .find(|r| r.url == url && r.method == method)
                .cloned()
                .ok_or(StorageError::NotFound)?;

            if let Some(minutes) = freshness_minutes {
                let cutoff = Utc::now() - Duration::minutes(minutes);
                if entry.last_accessed < cutoff {
                    return Err(StorageError::NotFound);
                }
            }

            Ok(entry)
        })
    }

    fn insert(
        &self,
        mut entry: ResponseCacheEntry,
    ) -> Pin<Box<dyn Future<Output = Result<ResponseCacheEntry, StorageError>> + Send + '_>> {
        Box::pin(async move {
            entry.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            lock(&self.rows).push(entry.clone());
            Ok(entry)
        })
    }

    fn update(
        &self,
        entry: ResponseCacheEntry,
    ) -> Pin<Box<dyn Future<Output = Result<ResponseCacheEntry, StorageError>> + Send + '_>> {
        Box::pin(async move {
            let mut rows = lock(&self.rows);
            let row = rows
                .iter_mut()
                .find(|r| r.id == entry.id)
                .ok_or(StorageError::NotFound)?;
            *row = entry.clone();
            Ok(entry)
        })
    }

    fn delete(
        &self,
        id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
        Box::pin(async move {
            let mut rows = lock(&self.rows);
            let before = rows.len();
            rows.retain(|r| r.id != id);
            if rows.len() == before {
                return Err(StorageError::NotFound);
            }
            Ok(())
        })
    }
}

/// Memory-backed [`CachePolicyStore`] with longest-prefix matching.
#[derive(Debug, Default)]
pub struct MemoryCachePolicyStore {
    rows: Mutex<Vec<CachePolicy>>,
    next_id: AtomicI64,
}

impl MemoryCachePolicyStore {
    /// Add a policy directly, assigning an id.
    pub fn seed(&self, mut policy: CachePolicy) {
        policy.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.rows).push(policy);
    }
}

impl CachePolicyStore for MemoryCachePolicyStore {
    fn find_by_url(
        &self,
        url: String,
        method: Method,
    ) -> Pin<Box<dyn Future<Output = Result<CachePolicy, StorageError>> + Send + '_>> {
        Box::pin(async move {
            lock(&self.rows)
                .iter()
                .filter(|p| p.method == method && url.starts_with(&p.base_url))
                .max_by_key(|p| p.base_url.len())
                .cloned()
                .ok_or(StorageError::NotFound)
        })
    }

    fn insert(
        &self,
        mut policy: CachePolicy,
    ) -> Pin<Box<dyn Future<Output = Result<CachePolicy, StorageError>> + Send + '_>> {
        Box::pin(async move {
            policy.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            lock(&self.rows).push(policy.clone());
            Ok(policy)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use storefront_kit_core::call_log::CallStatus;
    use storefront_kit_core::payload::Metadata;

    fn sample_log() -> CallLog {
        CallLog {
            id: 0,
            client_id: 1,
            client_type: "User".to_string(),
            transaction_id: 0,
            method: Method::Post,
            url: "http://payments.internal/charges".to_string(),
            header: String::new(),
            request: Metadata::new(),
            status: CallStatus::Calling,
            http_status_code: 0,
            reference_id: 0,
        }
    }

    #[tokio::test]
    async fn call_logs_get_generated_ids() {
        let store = MemoryCallLogStore::default();
        let first = store.insert(sample_log()).await.unwrap();
        let second = store.insert(sample_log()).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn updating_a_missing_row_is_not_found() {
        let store = MemoryCallLogStore::default();
        let mut log = sample_log();
        log.id = 99;
        assert_eq!(store.update(log).await, Err(StorageError::NotFound));
    }

    #[tokio::test]
    async fn policy_lookup_prefers_the_longest_prefix() {
        let store = MemoryCachePolicyStore::default();
        let base = CachePolicy {
            id: 0,
            base_url: "http://inventory.internal".to_string(),
            method: Method::Get,
            client_id: 1,
            client_name: "inventory".to_string(),
            buffered_time: 10,
            is_blocked: false,
        };
        store.seed(base.clone());
        store.seed(CachePolicy {
            base_url: "http://inventory.internal/items".to_string(),
            buffered_time: 60,
            ..base
        });

        let hit = store
            .find_by_url(
                "http://inventory.internal/items/42".to_string(),
                Method::Get,
            )
            .await
            .unwrap();
        assert_eq!(hit.buffered_time, 60);

        let miss = store
            .find_by_url("http://payments.internal/charges".to_string(), Method::Get)
            .await;
        assert_eq!(miss, Err(StorageError::NotFound));
    }

    #[tokio::test]
    async fn stale_cache_entries_are_filtered_by_freshness() {
        let store = MemoryResponseCacheStore::default();
        let entry = store
            .insert(ResponseCacheEntry {
                id: 0,
                url: "http://inventory.internal/items".to_string(),
                method: Method::Get,
                client_id: 1,
                client_name: "inventory".to_string(),
                response: Metadata::new(),
                last_accessed: Utc::now(),
            })
            .await
            .unwrap();

        store.age_entry(entry.id, 30);

        let fresh = store
            .find_by_url(entry.url.clone(), Method::Get, Some(10))
            .await;
        assert_eq!(fresh, Err(StorageError::NotFound));

        let any = store.find_by_url(entry.url.clone(), Method::Get, None).await;
        assert!(any.is_ok());
    }
}
