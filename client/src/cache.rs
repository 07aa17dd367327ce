//! Last-known-good response caching.
//!
//! Endpoints opt in through a [`CachePolicy`] row. On a successful call the
//! response is upserted as the endpoint's last known good value; when a call
//! fails, a fresh enough cached value is substituted and the failure is
//! suppressed. Cache plumbing failures are logged and swallowed: caching
//! must never break a call that would otherwise succeed.

use chrono::Utc;
use std::sync::Arc;
use storefront_kit_core::cache::{CachePolicy, ResponseCacheEntry};
use storefront_kit_core::call_log::Method;
use storefront_kit_core::payload::Metadata;
use storefront_kit_core::store::{CachePolicyStore, ResponseCacheStore, StorageError};

/// Policy-driven response cache used by the outbound client for fallback.
pub struct ResponseCacheService {
    policies: Arc<dyn CachePolicyStore>,
    entries: Arc<dyn ResponseCacheStore>,
}

impl ResponseCacheService {
    /// Create a service over the policy and entry stores.
    #[must_use]
    pub fn new(policies: Arc<dyn CachePolicyStore>, entries: Arc<dyn ResponseCacheStore>) -> Self {
        Self { policies, entries }
    }

    async fn policy_for(&self, url: &str, method: Method) -> Option<CachePolicy> {
        match self.policies.find_by_url(url.to_string(), method).await {
            Ok(policy) => Some(policy),
            Err(StorageError::NotFound) => None,
            Err(err) => {
                tracing::warn!(url, error = %err, "failed to look up cache policy");
                None
            }
        }
    }

    /// Whether a call to `url` may be served from cache on failure.
    ///
    /// Absence of a policy row is a normal `false`; so is a blocked policy.
    pub async fn is_eligible(&self, url: &str, method: Method) -> bool {
        self.policy_for(url, method)
            .await
            .is_some_and(|policy| !policy.is_blocked)
    }

    /// Last known good response for a failed call, if one exists within the
    /// policy's freshness window.
    pub async fn recover(&self, url: &str, cache_key: &str, method: Method) -> Option<Metadata> {
        let policy = self.policy_for(url, method).await?;
        if policy.is_blocked {
            return None;
        }

        match self
            .entries
            .find_by_url(cache_key.to_string(), method, Some(policy.buffered_time))
            .await
        {
            Ok(entry) => {
                tracing::warn!(
                    url,
                    "call failed, substituting last cached response and omitting the error"
                );
                metrics::counter!("outbound.cache_fallback").increment(1);
                Some(entry.response)
            }
            Err(StorageError::NotFound) => None,
            Err(err) => {
                tracing::warn!(url, error = %err, "failed to read cached response");
                None
            }
        }
    }

    /// Upsert the last known good response after a successful call.
    pub async fn record(
        &self,
        cache_key: &str,
        method: Method,
        client_id: i64,
        client_name: &str,
        response: Metadata,
    ) {
        let existing = self
            .entries
            .find_by_url(cache_key.to_string(), method, None)
            .await;

        let result = match existing {
            Ok(mut entry) => {
                entry.response = response;
                entry.last_accessed = Utc::now();
                self.entries.update(entry).await
            }
            Err(StorageError::NotFound) => {
                self.entries
                    .insert(ResponseCacheEntry {
                        id: 0,
                        url: cache_key.to_string(),
                        method,
                        client_id,
                        client_name: client_name.to_string(),
                        response,
                        last_accessed: Utc::now(),
                    })
                    .await
            }
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            tracing::warn!(cache_key, error = %err, "failed to record cached response");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use storefront_kit_testing::stores::{MemoryCachePolicyStore, MemoryResponseCacheStore};

    fn service_with_policy(policy: CachePolicy) -> (ResponseCacheService, Arc<MemoryResponseCacheStore>) {
        let policies = Arc::new(MemoryCachePolicyStore::default());
        policies.seed(policy);
        let entries = Arc::new(MemoryResponseCacheStore::default());
        (
            ResponseCacheService::new(policies, entries.clone()),
            entries,
        )
    }

    fn policy(base_url: &str, blocked: bool) -> CachePolicy {
        CachePolicy {
            id: 0,
            base_url: base_url.to_string(),
            method: Method::Get,
            client_id: 1,
            client_name: "inventory".to_string(),
            buffered_time: 10,
            is_blocked: blocked,
        }
    }

    #[tokio::test]
    async fn absent_policy_means_not_eligible() {
        let service = ResponseCacheService::new(
            Arc::new(MemoryCachePolicyStore::default()),
            Arc::new(MemoryResponseCacheStore::default()),
        );
        assert!(
            !service
                .is_eligible("http://inventory.internal/items", Method::Get)
                .await
        );
    }

    #[tokio::test]
    async fn blocked_policy_is_never_served() {
        let (service, _) = service_with_policy(policy("http://inventory.internal", true));
        assert!(
            !service
                .is_eligible("http://inventory.internal/items", Method::Get)
                .await
        );
        assert!(
            service
                .recover(
                    "http://inventory.internal/items",
                    "http://inventory.internal/items",
                    Method::Get
                )
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn record_then_recover_roundtrips() {
        let (service, _entries) = service_with_policy(policy("http://inventory.internal", false));

        let mut response = Metadata::new();
        response.insert("stock".to_string(), serde_json::json!(12));
        service
            .record(
                "http://inventory.internal/items",
                Method::Get,
                1,
                "inventory",
                response.clone(),
            )
            .await;

        let recovered = service
            .recover(
                "http://inventory.internal/items",
                "http://inventory.internal/items",
                Method::Get,
            )
            .await;
        assert_eq!(recovered, Some(response));
    }

    #[tokio::test]
    async fn record_updates_existing_entry_in_place() {
        let (service, entries) = service_with_policy(policy("http://inventory.internal", false));

        let mut first = Metadata::new();
        first.insert("stock".to_string(), serde_json::json!(1));
        let mut second = Metadata::new();
        second.insert("stock".to_string(), serde_json::json!(2));

        service
            .record("http://inventory.internal/items", Method::Get, 1, "inventory", first)
            .await;
        service
            .record("http://inventory.internal/items", Method::Get, 1, "inventory", second.clone())
            .await;

        assert_eq!(entries.len(), 1);
        let recovered = service
            .recover(
                "http://inventory.internal/items",
                "http://inventory.internal/items",
                Method::Get,
            )
            .await;
        assert_eq!(recovered, Some(second));
    }
}
