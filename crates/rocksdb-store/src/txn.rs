//! Retrying transaction runner shared by the stores.

use std::cell::RefCell;

use rockbound::{OptimisticTransactionDB, TransactionCtx, TransactionRetry};
use synccommittee_common::retry::{
    policies::{ExponentialBackoff, JitteredBackoff},
    retry_with_policy, RetryPolicy,
};
use synccommittee_db::{DbError, DbResult};

use crate::DbOpsConfig;

pub(crate) type Txn = TransactionCtx<OptimisticTransactionDB>;

/// Runs `op` in an optimistic transaction.
///
/// Commit conflicts are retried by rockbound itself. Conflicts reported by `op`
/// as [`DbError::TransactionConflict`] are retried here with a jittered
/// backoff, so that concurrent callers do not collide again right away. Domain
/// errors returned by `op` roll the transaction back and are returned as is.
pub(crate) fn run_in_txn<R, F>(
    db: &OptimisticTransactionDB,
    ops: &DbOpsConfig,
    name: &str,
    op: F,
) -> DbResult<R>
where
    F: Fn(&Txn) -> DbResult<R>,
{
    let policy =
        RetryPolicy::new().never_retry_if("domain validation error", DbError::is_domain_error);
    let backoff = JitteredBackoff::new(
        ExponentialBackoff::new(ops.backoff_base_ms, 2, 1),
        ops.max_jitter_ms,
    );

    retry_with_policy(name, ops.retry_count, &backoff, &policy, || {
        // rockbound wraps rollback errors; keep the original to hand it back typed
        let rollback = RefCell::new(None);
        db.with_optimistic_txn(TransactionRetry::Count(ops.retry_count), |txn| {
            op(txn).map_err(|err| {
                let msg = err.to_string();
                *rollback.borrow_mut() = Some(err);
                DbError::Other(msg)
            })
        })
        .map_err(|e: rockbound::TransactionError<_>| {
            rollback
                .take()
                .unwrap_or_else(|| DbError::TransactionError(e.to_string()))
        })
    })
}
