//! Transaction-counting database double.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use storefront_kit_core::manager::Database;
use storefront_kit_core::store::StorageError;

/// Opaque transaction handle handed out by [`MemoryDatabase`].
#[derive(Debug)]
pub struct MemoryTx(());

/// A [`Database`] that only counts. Commit failures can be scripted to test
/// the rollback-broadcast path.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    fail_commit: AtomicBool,
}

impl MemoryDatabase {
    /// Make the next (and every following) commit fail.
    pub fn set_fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Transactions opened.
    #[must_use]
    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    /// Transactions committed.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Transactions rolled back.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

impl Database for MemoryDatabase {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StorageError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryTx(()))
    }

    async fn commit(&self, _tx: MemoryTx) -> Result<(), StorageError> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(StorageError::Database("scripted commit failure".to_string()));
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self, _tx: MemoryTx) -> Result<(), StorageError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_outcomes() {
        let db = MemoryDatabase::default();

        let tx = db.begin().await.unwrap();
        db.commit(tx).await.unwrap();
        let tx = db.begin().await.unwrap();
        db.rollback(tx).await.unwrap();

        assert_eq!(db.begins(), 2);
        assert_eq!(db.commits(), 1);
        assert_eq!(db.rollbacks(), 1);

        db.set_fail_commit(true);
        let tx = db.begin().await.unwrap();
        assert!(db.commit(tx).await.is_err());
        assert_eq!(db.commits(), 1);
    }
}
