//! `PostgreSQL` storage for storefront-kit.
//!
//! Implements the storage trait seams from `storefront-kit-core` on top of
//! sqlx connection pools: call-log audit rows, the acknowledge audit trail,
//! cached responses and cache policies, plus the [`PgDatabase`] binding of
//! the transaction seam to `sqlx::Transaction`.
//!
//! Audit stores run their queries on the pool directly, outside any business
//! transaction, so call logs survive a rollback.
//!
//! # Example
//!
//! ```ignore
//! use storefront_kit_postgres::{PgCallLogStore, ensure_schema};
//!
//! async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//!     ensure_schema(&pool).await?;
//!     let call_logs = PgCallLogStore::new(pool);
//!     Ok(())
//! }
//! ```

pub mod acknowledge;
pub mod cache;
pub mod call_log;
pub mod database;
pub mod schema;

pub use acknowledge::PgAcknowledgeStore;
pub use cache::{PgCachePolicyStore, PgResponseCacheStore};
pub use call_log::PgCallLogStore;
pub use database::PgDatabase;
pub use schema::ensure_schema;

use storefront_kit_core::store::StorageError;

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::RowNotFound => StorageError::NotFound,
        other => StorageError::Database(other.to_string()),
    }
}

pub(crate) fn object_or_empty(
    value: serde_json::Value,
) -> serde_json::Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}
