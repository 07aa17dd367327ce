//! `PostgreSQL`-backed acknowledge audit trail.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;
use storefront_kit_core::acknowledge::{AcknowledgeRecord, CommitStatus};
use storefront_kit_core::store::{AcknowledgeStore, StorageError};

use crate::{map_sqlx_err, object_or_empty};

/// [`AcknowledgeStore`] over a `PgPool`. Append-only; records are never
/// updated or deleted.
#[derive(Debug, Clone)]
pub struct PgAcknowledgeStore {
    pool: PgPool,
}

impl PgAcknowledgeStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &PgRow) -> Result<AcknowledgeRecord, StorageError> {
    let commit_status: String = row.try_get("commit_status").map_err(map_sqlx_err)?;
    let reserved_holder: serde_json::Value =
        row.try_get("reserved_holder").map_err(map_sqlx_err)?;

    Ok(AcknowledgeRecord {
        id: row.try_get("id").map_err(map_sqlx_err)?,
        request_id: row.try_get("request_id").map_err(map_sqlx_err)?,
        commit_status: CommitStatus::parse(&commit_status)?,
        reserved_holder: object_or_empty(reserved_holder),
        reserved_holder_name: row.try_get("reserved_holder_name").map_err(map_sqlx_err)?,
        message: row.try_get("message").map_err(map_sqlx_err)?,
    })
}

impl AcknowledgeStore for PgAcknowledgeStore {
    fn insert(
        &self,
        record: AcknowledgeRecord,
    ) -> Pin<Box<dyn Future<Output = Result<AcknowledgeRecord, StorageError>> + Send + '_>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                INSERT INTO acknowledge_requests (
                    request_id, commit_status, reserved_holder,
                    reserved_holder_name, message
                )
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                ",
            )
            .bind(record.request_id)
            .bind(record.commit_status.as_str())
            .bind(serde_json::Value::Object(record.reserved_holder.clone()))
            .bind(&record.reserved_holder_name)
            .bind(&record.message)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

            let id: i64 = row.try_get("id").map_err(map_sqlx_err)?;
            Ok(AcknowledgeRecord { id, ..record })
        })
    }

    fn find_by_request(
        &self,
        request_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AcknowledgeRecord>, StorageError>> + Send + '_>>
    {
        Box::pin(async move {
            let rows = sqlx::query(
                r"
                SELECT id, request_id, commit_status, reserved_holder,
                       reserved_holder_name, message
                FROM acknowledge_requests
                WHERE request_id = $1
                ORDER BY id ASC
                ",
            )
            .bind(request_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

            rows.iter().map(row_to_record).collect()
        })
    }
}
