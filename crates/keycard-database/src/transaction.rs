//! Transactional executor.
//!
//! [`run_transaction`] runs an ordered list of operations against one
//! transaction. All of them commit together or none do:
//!
//! - the first failing operation stops the run, the transaction is rolled
//!   back, and the error names the operation by its 1-based position
//! - a rollback failure is reported together with the error that caused it
//! - a failed commit is followed by a rollback attempt, and the error says
//!   whether that attempt worked
//! - a panic inside an operation rolls the transaction back before the
//!   panic continues unwinding
//!
//! The backend is reached through [`TransactionSource`], so the executor
//! can be driven by Postgres in production and by an in-memory double in
//! tests.

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use keycard_core::ApiError;
use thiserror::Error;

use crate::error::DbError;

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Reads and writes.
    #[default]
    ReadWrite,
    /// Reads only; the backend rejects writes.
    ReadOnly,
}

impl AccessMode {
    /// SQL statement that opens a transaction in this mode.
    #[must_use]
    pub const fn begin_statement(self) -> &'static str {
        match self {
            Self::ReadWrite => "BEGIN",
            Self::ReadOnly => "BEGIN READ ONLY",
        }
    }
}

/// An open transaction.
#[async_trait]
pub trait Transaction: Send {
    /// Commits the transaction.
    async fn commit(&mut self) -> Result<(), sqlx::Error>;

    /// Rolls the transaction back.
    async fn rollback(&mut self) -> Result<(), sqlx::Error>;
}

/// Something that can open transactions.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// The transaction type handed to operations.
    type Tx: Transaction;

    /// Opens a transaction.
    async fn begin(&self, mode: AccessMode) -> Result<Self::Tx, sqlx::Error>;
}

/// One operation of a transaction unit.
pub type TxFn<T> =
    Box<dyn for<'c> FnOnce(&'c mut T) -> BoxFuture<'c, Result<(), DbError>> + Send>;

/// Boxes a closure as a [`TxFn`].
///
/// # Example
///
/// ```ignore
/// let op = tx_fn(move |tx: &mut PgTransaction| {
///     Box::pin(async move {
///         sqlx::query("UPDATE items SET name = $1 WHERE id = $2")
///             .bind(name)
///             .bind(id)
///             .execute(tx.conn())
///             .await?;
///         Ok(())
///     })
/// });
/// ```
pub fn tx_fn<T, F>(f: F) -> TxFn<T>
where
    F: for<'c> FnOnce(&'c mut T) -> BoxFuture<'c, Result<(), DbError>> + Send + 'static,
{
    Box::new(f)
}

/// Failure of a transaction unit.
#[derive(Debug, Error)]
pub enum TxError {
    /// The transaction could not be opened.
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] sqlx::Error),

    /// An operation failed and the transaction was rolled back.
    #[error("operation {index} failed: {source}")]
    Operation {
        /// 1-based position of the failing operation
        index: usize,
        /// The operation's error
        #[source]
        source: DbError,
    },

    /// The rollback after a failure failed too.
    #[error("failed to rollback transaction: {rollback}; original error: {original}")]
    RollbackFailed {
        /// The rollback error
        rollback: sqlx::Error,
        /// The failure that triggered the rollback
        #[source]
        original: Box<TxError>,
    },

    /// Commit failed; the transaction was rolled back.
    #[error("commit failed, transaction rolled back: {0}")]
    CommitRolledBack(#[source] sqlx::Error),

    /// Commit failed and the rollback attempt failed as well.
    #[error("commit failed: {commit}, subsequent rollback failed: {rollback}")]
    CommitAndRollbackFailed {
        /// The commit error
        #[source]
        commit: sqlx::Error,
        /// The rollback error
        rollback: sqlx::Error,
    },
}

impl TxError {
    /// Returns the 1-based index of the failing operation, if an operation
    /// failed.
    #[must_use]
    pub fn operation_index(&self) -> Option<usize> {
        match self {
            Self::Operation { index, .. } => Some(*index),
            Self::RollbackFailed { original, .. } => original.operation_index(),
            _ => None,
        }
    }

    /// Returns the operation's mapped error, if an operation failed.
    #[must_use]
    pub fn db_error(&self) -> Option<&DbError> {
        match self {
            Self::Operation { source, .. } => Some(source),
            Self::RollbackFailed { original, .. } => original.db_error(),
            _ => None,
        }
    }
}

impl From<&TxError> for ApiError {
    fn from(err: &TxError) -> Self {
        err.db_error().map_or(Self::Internal, Self::from)
    }
}

/// Runs `ops` in one read-write transaction.
pub async fn run_transaction<S>(source: &S, ops: Vec<TxFn<S::Tx>>) -> Result<(), TxError>
where
    S: TransactionSource,
{
    execute(source, AccessMode::ReadWrite, ops).await
}

/// Runs `ops` in one read-only transaction.
pub async fn run_read_only_transaction<S>(
    source: &S,
    ops: Vec<TxFn<S::Tx>>,
) -> Result<(), TxError>
where
    S: TransactionSource,
{
    execute(source, AccessMode::ReadOnly, ops).await
}

async fn execute<S>(source: &S, mode: AccessMode, ops: Vec<TxFn<S::Tx>>) -> Result<(), TxError>
where
    S: TransactionSource,
{
    let mut tx = source.begin(mode).await.map_err(TxError::Begin)?;

    let outcome = AssertUnwindSafe(run_operations(&mut tx, ops))
        .catch_unwind()
        .await;

    match outcome {
        Err(payload) => {
            if let Err(e) = tx.rollback().await {
                tracing::error!(error = %e, "rollback after panic failed");
            }
            std::panic::resume_unwind(payload)
        }
        Ok(Err(err)) => match tx.rollback().await {
            Ok(()) => Err(err),
            Err(rollback) => Err(TxError::RollbackFailed {
                rollback,
                original: Box::new(err),
            }),
        },
        Ok(Ok(())) => match tx.commit().await {
            Ok(()) => Ok(()),
            Err(commit) => match tx.rollback().await {
                Ok(()) => Err(TxError::CommitRolledBack(commit)),
                Err(rollback) => Err(TxError::CommitAndRollbackFailed { commit, rollback }),
            },
        },
    }
}

async fn run_operations<T: Send>(tx: &mut T, ops: Vec<TxFn<T>>) -> Result<(), TxError> {
    for (i, op) in ops.into_iter().enumerate() {
        op(tx)
            .await
            .map_err(|source| TxError::Operation { index: i + 1, source })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbErrorKind;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct Journal {
        begun: Vec<AccessMode>,
        commits: usize,
        rollbacks: usize,
        writes: Vec<&'static str>,
        fail_commit: bool,
        fail_rollback: bool,
        fail_begin: bool,
    }

    #[derive(Clone, Default)]
    struct MockSource {
        journal: Arc<Mutex<Journal>>,
    }

    struct MockTx {
        journal: Arc<Mutex<Journal>>,
    }

    impl MockTx {
        fn write(&mut self, value: &'static str) {
            self.journal.lock().writes.push(value);
        }
    }

    #[async_trait]
    impl Transaction for MockTx {
        async fn commit(&mut self) -> Result<(), sqlx::Error> {
            let mut journal = self.journal.lock();
            if journal.fail_commit {
                return Err(sqlx::Error::Protocol("commit refused".into()));
            }
            journal.commits += 1;
            Ok(())
        }

        async fn rollback(&mut self) -> Result<(), sqlx::Error> {
            let mut journal = self.journal.lock();
            if journal.fail_rollback {
                return Err(sqlx::Error::Protocol("rollback refused".into()));
            }
            journal.rollbacks += 1;
            Ok(())
        }
    }

    #[async_trait]
    impl TransactionSource for MockSource {
        type Tx = MockTx;

        async fn begin(&self, mode: AccessMode) -> Result<MockTx, sqlx::Error> {
            let mut journal = self.journal.lock();
            if journal.fail_begin {
                return Err(sqlx::Error::PoolTimedOut);
            }
            journal.begun.push(mode);
            Ok(MockTx {
                journal: Arc::clone(&self.journal),
            })
        }
    }

    fn write(value: &'static str) -> TxFn<MockTx> {
        tx_fn(move |tx: &mut MockTx| {
            Box::pin(async move {
                tx.write(value);
                Ok(())
            })
        })
    }

    fn fail(kind: DbErrorKind) -> TxFn<MockTx> {
        tx_fn(move |_tx: &mut MockTx| Box::pin(async move { Err(DbError::from(kind)) }))
    }

    fn explode(_tx: &mut MockTx) -> Result<(), DbError> {
        panic!("operation exploded")
    }

    #[tokio::test]
    async fn test_all_succeed_commits_once() {
        let source = MockSource::default();
        run_transaction(&source, vec![write("a"), write("b"), write("c")])
            .await
            .unwrap();

        let journal = source.journal.lock();
        assert_eq!(journal.begun, vec![AccessMode::ReadWrite]);
        assert_eq!(journal.writes, vec!["a", "b", "c"]);
        assert_eq!(journal.commits, 1);
        assert_eq!(journal.rollbacks, 0);
    }

    #[tokio::test]
    async fn test_failure_stops_and_rolls_back() {
        let source = MockSource::default();
        let err = run_transaction(
            &source,
            vec![write("a"), fail(DbErrorKind::UniqueViolation), write("c")],
        )
        .await
        .unwrap_err();

        assert_eq!(err.operation_index(), Some(2));
        assert_eq!(err.to_string(), "operation 2 failed: unique violation");
        assert!(err.db_error().unwrap().is(DbErrorKind::UniqueViolation));

        let journal = source.journal.lock();
        assert_eq!(journal.writes, vec!["a"]);
        assert_eq!(journal.commits, 0);
        assert_eq!(journal.rollbacks, 1);
    }

    #[tokio::test]
    async fn test_rollback_failure_keeps_original() {
        let source = MockSource::default();
        source.journal.lock().fail_rollback = true;

        let err = run_transaction(&source, vec![fail(DbErrorKind::NotFound)])
            .await
            .unwrap_err();

        assert!(matches!(err, TxError::RollbackFailed { .. }));
        assert_eq!(err.operation_index(), Some(1));
        let text = err.to_string();
        assert!(text.contains("rollback refused"), "{text}");
        assert!(text.contains("operation 1 failed: record not found"), "{text}");
    }

    #[tokio::test]
    async fn test_commit_failure_rolls_back() {
        let source = MockSource::default();
        source.journal.lock().fail_commit = true;

        let err = run_transaction(&source, vec![write("a")]).await.unwrap_err();

        assert!(matches!(err, TxError::CommitRolledBack(_)));
        assert_eq!(source.journal.lock().rollbacks, 1);
    }

    #[tokio::test]
    async fn test_commit_and_rollback_failure() {
        let source = MockSource::default();
        {
            let mut journal = source.journal.lock();
            journal.fail_commit = true;
            journal.fail_rollback = true;
        }

        let err = run_transaction(&source, vec![write("a")]).await.unwrap_err();
        assert!(matches!(err, TxError::CommitAndRollbackFailed { .. }));
        assert!(err.operation_index().is_none());
    }

    #[tokio::test]
    async fn test_begin_failure_runs_nothing() {
        let source = MockSource::default();
        source.journal.lock().fail_begin = true;

        let err = run_transaction(&source, vec![write("a")]).await.unwrap_err();
        assert!(matches!(err, TxError::Begin(_)));
        assert!(source.journal.lock().writes.is_empty());
    }

    #[tokio::test]
    async fn test_panic_rolls_back_then_propagates() {
        let source = MockSource::default();
        let ops = vec![
            write("a"),
            tx_fn(|tx: &mut MockTx| Box::pin(async move { explode(tx) })),
        ];

        let outcome = AssertUnwindSafe(run_transaction(&source, ops))
            .catch_unwind()
            .await;

        assert!(outcome.is_err(), "panic should propagate");
        let journal = source.journal.lock();
        assert_eq!(journal.rollbacks, 1);
        assert_eq!(journal.commits, 0);
    }

    #[tokio::test]
    async fn test_read_only_mode() {
        let source = MockSource::default();
        run_read_only_transaction(&source, vec![]).await.unwrap();

        let journal = source.journal.lock();
        assert_eq!(journal.begun, vec![AccessMode::ReadOnly]);
        assert_eq!(journal.commits, 1);
    }

    #[test]
    fn test_api_error_from_tx_error() {
        let err = TxError::Operation {
            index: 1,
            source: DbError::from(DbErrorKind::NotFound),
        };
        assert_eq!(ApiError::from(&err), ApiError::NotFound);
        assert_eq!(
            ApiError::from(&TxError::Begin(sqlx::Error::PoolTimedOut)),
            ApiError::Internal
        );
    }

    #[test]
    fn test_begin_statements() {
        assert_eq!(AccessMode::ReadWrite.begin_statement(), "BEGIN");
        assert_eq!(AccessMode::ReadOnly.begin_statement(), "BEGIN READ ONLY");
    }
}
