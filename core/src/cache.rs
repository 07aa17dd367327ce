//! Response cache records and per-endpoint cache policy.

use crate::call_log::Method;
use crate::payload::Metadata;
use chrono::{DateTime, Utc};

/// The last-known-good response for one (cache key, method) pair.
///
/// For non-GET calls the cache key includes the serialized request body, so
/// distinct payloads to the same endpoint are distinct cacheable results.
/// Updated in place on every successful call to an eligible endpoint; read
/// back only when a live call fails.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseCacheEntry {
    /// Generated row id.
    pub id: i64,
    /// Cache key: full URL, plus the request body for non-GET calls.
    pub url: String,
    /// HTTP method of the cached call.
    pub method: Method,
    /// Identity that produced the cached response.
    pub client_id: i64,
    /// Name of the outbound client that produced it.
    pub client_name: String,
    /// The cached response body view.
    pub response: Metadata,
    /// When the entry was last refreshed; freshness is judged against this.
    pub last_accessed: DateTime<Utc>,
}

/// Governs whether an endpoint is eligible for cache fallback and how stale
/// a cached value may be.
///
/// Matched by best (longest) `base_url` prefix against the requested URL.
/// Absence of a policy row means "not eligible", not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    /// Generated row id.
    pub id: i64,
    /// URL prefix this policy applies to.
    pub base_url: String,
    /// HTTP method this policy applies to.
    pub method: Method,
    /// Identity that owns the policy.
    pub client_id: i64,
    /// Name of the outbound client the policy was registered for.
    pub client_name: String,
    /// Freshness window in minutes; entries older than this are stale.
    pub buffered_time: i64,
    /// A blocked endpoint is never served from cache.
    pub is_blocked: bool,
}
