//! `sqlx` binding of the transaction seam.

use sqlx::PgPool;
use storefront_kit_core::manager::Database;
use storefront_kit_core::store::StorageError;

use crate::map_sqlx_err;

/// [`Database`] implementation over a `PgPool`.
///
/// Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for callers that also run their own queries.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Database for PgDatabase {
    type Tx = sqlx::Transaction<'static, sqlx::Postgres>;

    async fn begin(&self) -> Result<Self::Tx, StorageError> {
        self.pool.begin().await.map_err(map_sqlx_err)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StorageError> {
        tx.commit().await.map_err(map_sqlx_err)
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StorageError> {
        tx.rollback().await.map_err(map_sqlx_err)
    }
}
