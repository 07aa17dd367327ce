//! `PostgreSQL`-backed response cache and cache policies.

use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;
use storefront_kit_core::cache::{CachePolicy, ResponseCacheEntry};
use storefront_kit_core::call_log::Method;
use storefront_kit_core::store::{CachePolicyStore, ResponseCacheStore, StorageError};

use crate::{map_sqlx_err, object_or_empty};

/// [`ResponseCacheStore`] over a `PgPool`.
#[derive(Debug, Clone)]
pub struct PgResponseCacheStore {
    pool: PgPool,
}

impl PgResponseCacheStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_entry(row: &PgRow) -> Result<ResponseCacheEntry, StorageError> {
    let method: String = row.try_get("method").map_err(map_sqlx_err)?;
    let response: serde_json::Value = row.try_get("response").map_err(map_sqlx_err)?;

    Ok(ResponseCacheEntry {
        id: row.try_get("id").map_err(map_sqlx_err)?,
        url: row.try_get("url").map_err(map_sqlx_err)?,
        method: Method::parse(&method)?,
        client_id: row.try_get("client_id").map_err(map_sqlx_err)?,
        client_name: row.try_get("client_name").map_err(map_sqlx_err)?,
        response: object_or_empty(response),
        last_accessed: row.try_get("last_accessed").map_err(map_sqlx_err)?,
    })
}

impl ResponseCacheStore for PgResponseCacheStore {
    fn find_by_url(
        &self,
        url: String,
        method: Method,
        freshness_minutes: Option<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<ResponseCacheEntry, StorageError>> + Send + '_>> {
        Box::pin(async move {
            let cutoff: Option<DateTime<Utc>> =
                freshness_minutes.map(|minutes| Utc::now() - Duration::minutes(minutes));

            let row = sqlx::query(
                r"
                SELECT id, url, method, client_id, client_name, response,
                       last_accessed
                FROM response_caches
                WHERE url = $1
                  AND method = $2
                  AND ($3::timestamptz IS NULL OR last_accessed >= $3)
                ",
            )
            .bind(&url)
            .bind(method.as_str())
            .bind(cutoff)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

            row_to_entry(&row)
        })
    }

    fn insert(
        &self,
        entry: ResponseCacheEntry,
    ) -> Pin<Box<dyn Future<Output = Result<ResponseCacheEntry, StorageError>> + Send + '_>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                INSERT INTO response_caches (
                    url, method, client_id, client_name, response, last_accessed
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id
                ",
            )
            .bind(&entry.url)
            .bind(entry.method.as_str())
            .bind(entry.client_id)
            .bind(&entry.client_name)
            .bind(serde_json::Value::Object(entry.response.clone()))
            .bind(entry.last_accessed)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

            let id: i64 = row.try_get("id").map_err(map_sqlx_err)?;
            Ok(ResponseCacheEntry { id, ..entry })
        })
    }

    fn update(
        &self,
        entry: ResponseCacheEntry,
    ) -> Pin<Box<dyn Future<Output = Result<ResponseCacheEntry, StorageError>> + Send + '_>> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE response_caches
                SET url = $2, method = $3, client_id = $4, client_name = $5,
                    response = $6, last_accessed = $7
                WHERE id = $1
                ",
            )
            .bind(entry.id)
            .bind(&entry.url)
            .bind(entry.method.as_str())
            .bind(entry.client_id)
            .bind(&entry.client_name)
            .bind(serde_json::Value::Object(entry.response.clone()))
            .bind(entry.last_accessed)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

            if result.rows_affected() == 0 {
                return Err(StorageError::NotFound);
            }
            Ok(entry)
        })
    }

    fn delete(
        &self,
        id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM response_caches WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

            if result.rows_affected() == 0 {
                return Err(StorageError::NotFound);
            }
            Ok(())
        })
    }
}

/// [`CachePolicyStore`] over a `PgPool`.
///
/// Lookup is longest-prefix: of all policies whose `base_url` is a prefix of
/// the requested URL (same method), the longest prefix wins.
#[derive(Debug, Clone)]
pub struct PgCachePolicyStore {
    pool: PgPool,
}

impl PgCachePolicyStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_policy(row: &PgRow) -> Result<CachePolicy, StorageError> {
    let method: String = row.try_get("method").map_err(map_sqlx_err)?;

    Ok(CachePolicy {
        id: row.try_get("id").map_err(map_sqlx_err)?,
        base_url: row.try_get("base_url").map_err(map_sqlx_err)?,
        method: Method::parse(&method)?,
        client_id: row.try_get("client_id").map_err(map_sqlx_err)?,
        client_name: row.try_get("client_name").map_err(map_sqlx_err)?,
        buffered_time: row.try_get("buffered_time").map_err(map_sqlx_err)?,
        is_blocked: row.try_get("is_blocked").map_err(map_sqlx_err)?,
    })
}

impl CachePolicyStore for PgCachePolicyStore {
    fn find_by_url(
        &self,
        url: String,
        method: Method,
    ) -> Pin<Box<dyn Future<Output = Result<CachePolicy, StorageError>> + Send + '_>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT id, base_url, method, client_id, client_name,
                       buffered_time, is_blocked
                FROM cache_policies
                WHERE method = $2 AND $1 LIKE base_url || '%'
                ORDER BY length(base_url) DESC
                LIMIT 1
                ",
            )
            .bind(&url)
            .bind(method.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .ok_or(StorageError::NotFound)?;

            row_to_policy(&row)
        })
    }

    fn insert(
        &self,
        policy: CachePolicy,
    ) -> Pin<Box<dyn Future<Output = Result<CachePolicy, StorageError>> + Send + '_>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                INSERT INTO cache_policies (
                    base_url, method, client_id, client_name, buffered_time,
                    is_blocked
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id
                ",
            )
            .bind(&policy.base_url)
            .bind(policy.method.as_str())
            .bind(policy.client_id)
            .bind(&policy.client_name)
            .bind(policy.buffered_time)
            .bind(policy.is_blocked)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

            let id: i64 = row.try_get("id").map_err(map_sqlx_err)?;
            Ok(CachePolicy { id, ..policy })
        })
    }
}
