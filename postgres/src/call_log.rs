//! `PostgreSQL`-backed call-log store.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;
use storefront_kit_core::call_log::{CallLog, CallStatus, Method};
use storefront_kit_core::store::{CallLogStore, StorageError};

use crate::{map_sqlx_err, object_or_empty};

/// [`CallLogStore`] over a `PgPool`.
///
/// Queries run on the pool directly, never inside the business transaction,
/// so rows survive a rollback.
#[derive(Debug, Clone)]
pub struct PgCallLogStore {
    pool: PgPool,
}

impl PgCallLogStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_call_log(row: &PgRow) -> Result<CallLog, StorageError> {
    let method: String = row.try_get("method").map_err(map_sqlx_err)?;
    let status: String = row.try_get("status").map_err(map_sqlx_err)?;
    let http_status_code: i32 = row.try_get("http_status_code").map_err(map_sqlx_err)?;
    let request: serde_json::Value = row.try_get("request").map_err(map_sqlx_err)?;

    Ok(CallLog {
        id: row.try_get("id").map_err(map_sqlx_err)?,
        client_id: row.try_get("client_id").map_err(map_sqlx_err)?,
        client_type: row.try_get("client_type").map_err(map_sqlx_err)?,
        transaction_id: row.try_get("transaction_id").map_err(map_sqlx_err)?,
        method: Method::parse(&method)?,
        url: row.try_get("url").map_err(map_sqlx_err)?,
        header: row.try_get("header").map_err(map_sqlx_err)?,
        request: object_or_empty(request),
        status: CallStatus::parse(&status)?,
        http_status_code: u16::try_from(http_status_code).unwrap_or(0),
        reference_id: row.try_get("reference_id").map_err(map_sqlx_err)?,
    })
}

impl CallLogStore for PgCallLogStore {
    fn insert(
        &self,
        log: CallLog,
    ) -> Pin<Box<dyn Future<Output = Result<CallLog, StorageError>> + Send + '_>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                INSERT INTO call_logs (
                    client_id, client_type, transaction_id, method, url,
                    header, request, status, http_status_code, reference_id
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                RETURNING id
                ",
            )
            .bind(log.client_id)
            .bind(&log.client_type)
            .bind(log.transaction_id)
            .bind(log.method.as_str())
            .bind(&log.url)
            .bind(&log.header)
            .bind(serde_json::Value::Object(log.request.clone()))
            .bind(log.status.as_str())
            .bind(i32::from(log.http_status_code))
            .bind(log.reference_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

            let id: i64 = row.try_get("id").map_err(map_sqlx_err)?;
            Ok(CallLog { id, ..log })
        })
    }

    fn update(
        &self,
        log: CallLog,
    ) -> Pin<Box<dyn Future<Output = Result<CallLog, StorageError>> + Send + '_>> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE call_logs
                SET client_id = $2, client_type = $3, transaction_id = $4,
                    method = $5, url = $6, header = $7, request = $8,
                    status = $9, http_status_code = $10, reference_id = $11,
                    updated_at = NOW()
                WHERE id = $1
                ",
            )
            .bind(log.id)
            .bind(log.client_id)
            .bind(&log.client_type)
            .bind(log.transaction_id)
            .bind(log.method.as_str())
            .bind(&log.url)
            .bind(&log.header)
            .bind(serde_json::Value::Object(log.request.clone()))
            .bind(log.status.as_str())
            .bind(i32::from(log.http_status_code))
            .bind(log.reference_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

            if result.rows_affected() == 0 {
                return Err(StorageError::NotFound);
            }
            Ok(log)
        })
    }

    fn find_by_id(
        &self,
        id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<CallLog, StorageError>> + Send + '_>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT id, client_id, client_type, transaction_id, method,
                       url, header, request, status, http_status_code,
                       reference_id
                FROM call_logs
                WHERE id = $1
                ",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

            row_to_call_log(&row)
        })
    }

    fn delete(
        &self,
        id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM call_logs WHERE id = $1")
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
