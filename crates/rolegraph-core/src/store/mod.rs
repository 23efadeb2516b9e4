//! Keyed storage for items, edges and assignments, plus the coordinator for
//! mutations that span all three.

pub mod assignments;
pub mod coordinator;
pub mod items;

pub use assignments::AssignmentStore;
pub use coordinator::{ReferentialMode, TransactionCoordinator};
pub use items::GraphStore;

use tracing::warn;

use crate::db::Backend;
use crate::error::{Result, StoreError};

/// Run `op` inside a transaction on `db`.
///
/// Joins the caller's transaction when one is already open. Otherwise opens
/// one, commits on success and rolls back on error, returning the original
/// error. A failed rollback is reported as
/// [`StoreError::TransactionFailure`] carrying the original error as its
/// source.
pub(crate) fn atomically<T>(
    db: &dyn Backend,
    operation: &str,
    op: impl FnOnce() -> Result<T>,
) -> Result<T> {
    if db.in_transaction() {
        return op();
    }
    db.begin()?;
    finish(db, operation, op())
}

/// Commit or roll back the transaction opened for `operation`.
pub(crate) fn finish<T>(db: &dyn Backend, operation: &str, outcome: Result<T>) -> Result<T> {
    let error = match outcome {
        Ok(value) => match db.commit() {
            Ok(()) => return Ok(value),
            Err(error) => error,
        },
        Err(error) => error,
    };

    match db.rollback() {
        Ok(()) => Err(error),
        Err(rollback) if !db.in_transaction() => {
            // A failed commit may already have ended the transaction.
            warn!(operation, %rollback, "rollback after failure found no open transaction");
            Err(error)
        }
        Err(rollback) => {
            warn!(operation, %error, %rollback, "rollback failed");
            Err(StoreError::TransactionFailure {
                reason: format!("rollback of {operation} failed: {rollback}"),
                cause: Some(Box::new(error)),
            })
        }
    }
}
