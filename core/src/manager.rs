//! The transaction manager: one unit of work, one broadcast.
//!
//! [`TransactionManager::run_in_transaction`] brackets the caller's work in
//! a database transaction and, once the local outcome is settled, broadcasts
//! the matching `commit`/`rollback` decision to every outbound call the work
//! registered. The local transaction's correctness never depends on the
//! broadcast succeeding: prepare and broadcast failures are logged, not
//! propagated.

use crate::acknowledge::{AcknowledgeHook, Decision};
use crate::scope::RequestScope;
use crate::store::StorageError;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// A source of database transactions.
///
/// The transaction value is moved into the work closure and handed back, so
/// no lifetimes cross the async boundary. The postgres crate binds this to
/// `sqlx::Transaction`; the testing crate provides an in-memory recorder.
pub trait Database: Send + Sync {
    /// The transaction handle type.
    type Tx: Send;

    /// Open a transaction.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx, StorageError>> + Send;

    /// Commit a transaction.
    fn commit(&self, tx: Self::Tx) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Roll back a transaction.
    fn rollback(&self, tx: Self::Tx) -> impl Future<Output = Result<(), StorageError>> + Send;
}

impl<D: Database> Database for Arc<D> {
    type Tx = D::Tx;

    fn begin(&self) -> impl Future<Output = Result<Self::Tx, StorageError>> + Send {
        (**self).begin()
    }

    fn commit(&self, tx: Self::Tx) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).commit(tx)
    }

    fn rollback(&self, tx: Self::Tx) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).rollback(tx)
    }
}

/// Errors from [`TransactionManager::run_in_transaction`].
#[derive(Debug, Error)]
pub enum ManagerError<E: Display + Debug> {
    /// The transaction could not be opened.
    #[error("error when creating transaction: {0}")]
    Begin(StorageError),
    /// The work succeeded but the final commit failed. A rollback was
    /// broadcast to all pending calls.
    #[error("error when committing transaction: {0}")]
    Commit(StorageError),
    /// The work itself failed. The transaction was rolled back and a
    /// rollback was broadcast to all pending calls.
    #[error(transparent)]
    Work(E),
}

/// Coordinates a local database transaction with the acknowledge broadcast.
pub struct TransactionManager<D: Database> {
    db: D,
    hook: Arc<dyn AcknowledgeHook>,
}

impl<D: Database> TransactionManager<D> {
    /// Create a manager over `db`, broadcasting through `hook`.
    pub fn new(db: D, hook: Arc<dyn AcknowledgeHook>) -> Self {
        Self { db, hook }
    }

    /// Run `work` inside a database transaction scoped to `scope`.
    ///
    /// The transaction handle is moved into `work` and must be handed back
    /// alongside the outcome. Three endings:
    ///
    /// - `work` errored: the transaction is rolled back, `rollback` is
    ///   broadcast with the error's message, and the original error is
    ///   returned.
    /// - the commit failed: `rollback` is broadcast with the commit error's
    ///   message and a wrapped commit error is returned.
    /// - both succeeded: `commit` is broadcast.
    ///
    /// The broadcast runs exactly once per invocation, after the local
    /// outcome is final; its own failures are logged and swallowed.
    ///
    /// # Errors
    ///
    /// [`ManagerError::Begin`], [`ManagerError::Work`] or
    /// [`ManagerError::Commit`].
    pub async fn run_in_transaction<F, Fut, E>(
        &self,
        scope: &RequestScope,
        work: F,
    ) -> Result<(), ManagerError<E>>
    where
        F: FnOnce(D::Tx) -> Fut,
        Fut: Future<Output = (D::Tx, Result<(), E>)> + Send,
        E: Display + Debug,
    {
        let tx = self.db.begin().await.map_err(ManagerError::Begin)?;

        if let Err(err) = self.hook.prepare(scope).await {
            tracing::warn!(error = %err, "prepare failed; call logs will have no reference id");
        }

        let (tx, outcome) = work(tx).await;

        match outcome {
            Err(err) => {
                if let Err(rollback_err) = self.db.rollback(tx).await {
                    tracing::error!(error = %rollback_err, "failed to roll back transaction");
                }
                self.broadcast(scope, Decision::Rollback, &err.to_string())
                    .await;
                Err(ManagerError::Work(err))
            }
            Ok(()) => match self.db.commit(tx).await {
                Err(commit_err) => {
                    self.broadcast(
                        scope,
                        Decision::Rollback,
                        &format!("error when committing: {commit_err}"),
                    )
                    .await;
                    Err(ManagerError::Commit(commit_err))
                }
                Ok(()) => {
                    self.broadcast(scope, Decision::Commit, "").await;
                    Ok(())
                }
            },
        }
    }

    async fn broadcast(&self, scope: &RequestScope, decision: Decision, message: &str) {
        if let Err(err) = self.hook.acknowledge(scope, decision, message).await {
            tracing::warn!(
                decision = decision.as_str(),
                error = %err,
                "acknowledge broadcast failed"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use crate::error::CallError;
    use crate::scope::Actor;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingDb {
        commits: AtomicUsize,
        rollbacks: AtomicUsize,
    }

    struct Tx;

    impl Database for CountingDb {
        type Tx = Tx;

        async fn begin(&self) -> Result<Tx, StorageError> {
            Ok(Tx)
        }

        async fn commit(&self, _tx: Tx) -> Result<(), StorageError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn rollback(&self, _tx: Tx) -> Result<(), StorageError> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingHook {
        decisions: Mutex<Vec<(Decision, String)>>,
    }

    impl AcknowledgeHook for RecordingHook {
        fn prepare<'a>(
            &'a self,
            scope: &'a RequestScope,
        ) -> Pin<Box<dyn Future<Output = Result<(), CallError>> + Send + 'a>> {
            Box::pin(async move {
                scope.set_reference_id(42);
                Ok(())
            })
        }

        fn acknowledge<'a>(
            &'a self,
            scope: &'a RequestScope,
            decision: Decision,
            message: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<(), CallError>> + Send + 'a>> {
            Box::pin(async move {
                scope.set_decision(decision);
                self.decisions
                    .lock()
                    .unwrap()
                    .push((decision, message.to_string()));
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn successful_work_commits_and_broadcasts_commit() {
        let hook = Arc::new(RecordingHook::default());
        let manager = TransactionManager::new(CountingDb::default(), hook.clone());
        let scope = RequestScope::new(Actor::System);

        let result = manager
            .run_in_transaction(&scope, |tx| async move { (tx, Ok::<(), String>(())) })
            .await;

        assert!(result.is_ok());
        assert_eq!(manager.db.commits.load(Ordering::SeqCst), 1);
        assert_eq!(manager.db.rollbacks.load(Ordering::SeqCst), 0);
        assert_eq!(scope.reference_id(), Some(42));

        let decisions = hook.decisions.lock().unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].0, Decision::Commit);
    }

    #[tokio::test]
    async fn failing_work_rolls_back_and_broadcasts_rollback() {
        let hook = Arc::new(RecordingHook::default());
        let manager = TransactionManager::new(CountingDb::default(), hook.clone());
        let scope = RequestScope::new(Actor::System);

        let result = manager
            .run_in_transaction(&scope, |tx| async move {
                (tx, Err::<(), String>("inventory unavailable".to_string()))
            })
            .await;

        match result {
            Err(ManagerError::Work(msg)) => assert_eq!(msg, "inventory unavailable"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(manager.db.commits.load(Ordering::SeqCst), 0);
        assert_eq!(manager.db.rollbacks.load(Ordering::SeqCst), 1);

        let decisions = hook.decisions.lock().unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].0, Decision::Rollback);
        assert_eq!(decisions[0].1, "inventory unavailable");
    }

    struct FailingCommitDb;

    impl Database for FailingCommitDb {
        type Tx = Tx;

        async fn begin(&self) -> Result<Tx, StorageError> {
            Ok(Tx)
        }

        async fn commit(&self, _tx: Tx) -> Result<(), StorageError> {
            Err(StorageError::Database("connection lost".to_string()))
        }

        async fn rollback(&self, _tx: Tx) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn commit_failure_broadcasts_rollback() {
        let hook = Arc::new(RecordingHook::default());
        let manager = TransactionManager::new(FailingCommitDb, hook.clone());
        let scope = RequestScope::new(Actor::System);

        let result = manager
            .run_in_transaction(&scope, |tx| async move { (tx, Ok::<(), String>(())) })
            .await;

        assert!(matches!(result, Err(ManagerError::Commit(_))));

        let decisions = hook.decisions.lock().unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].0, Decision::Rollback);
        assert!(decisions[0].1.contains("error when committing"));
    }
}
