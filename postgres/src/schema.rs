//! Table definitions for the storefront-kit audit and cache stores.

use sqlx::PgPool;
use storefront_kit_core::store::StorageError;

use crate::map_sqlx_err;

/// Create the storefront-kit tables if they do not exist.
///
/// Idempotent; services call this once at startup.
///
/// # Errors
///
/// Returns [`StorageError::Database`] when a statement fails.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS call_logs (
            id BIGSERIAL PRIMARY KEY,
            client_id BIGINT NOT NULL DEFAULT 0,
            client_type TEXT NOT NULL DEFAULT '',
            transaction_id BIGINT NOT NULL DEFAULT 0,
            method TEXT NOT NULL,
            url TEXT NOT NULL,
            header TEXT NOT NULL DEFAULT '',
            request JSONB NOT NULL DEFAULT '{}',
            status TEXT NOT NULL,
            http_status_code INTEGER NOT NULL DEFAULT 0,
            reference_id BIGINT NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    )
    .execute(pool)
    .await
    .map_err(map_sqlx_err)?;

    sqlx::query(
        r"
        CREATE INDEX IF NOT EXISTS idx_call_logs_reference_id
        ON call_logs (reference_id)
        ",
    )
    .execute(pool)
    .await
    .map_err(map_sqlx_err)?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS acknowledge_requests (
            id BIGSERIAL PRIMARY KEY,
            request_id BIGINT NOT NULL,
            commit_status TEXT NOT NULL,
            reserved_holder JSONB NOT NULL DEFAULT '{}',
            reserved_holder_name TEXT NOT NULL DEFAULT '',
            message TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    )
    .execute(pool)
    .await
    .map_err(map_sqlx_err)?;

    sqlx::query(
        r"
        CREATE INDEX IF NOT EXISTS idx_acknowledge_requests_request_id
        ON acknowledge_requests (request_id)
        ",
    )
    .execute(pool)
    .await
    .map_err(map_sqlx_err)?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS response_caches (
            id BIGSERIAL PRIMARY KEY,
            url TEXT NOT NULL,
            method TEXT NOT NULL,
            client_id BIGINT NOT NULL DEFAULT 0,
            client_name TEXT NOT NULL DEFAULT '',
            response JSONB NOT NULL DEFAULT '{}',
            last_accessed TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (url, method)
        )
        ",
    )
    .execute(pool)
    .await
    .map_err(map_sqlx_err)?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS cache_policies (
            id BIGSERIAL PRIMARY KEY,
            base_url TEXT NOT NULL,
            method TEXT NOT NULL,
            client_id BIGINT NOT NULL DEFAULT 0,
            client_name TEXT NOT NULL DEFAULT '',
            buffered_time BIGINT NOT NULL DEFAULT 0,
            is_blocked BOOLEAN NOT NULL DEFAULT FALSE
        )
        ",
    )
    .execute(pool)
    .await
    .map_err(map_sqlx_err)?;

    Ok(())
}
