//! Set-based bulk statements for sqlext.
//!
//! `BulkDelete` and `BulkUpdate` turn a table plus a predicate or a
//! key-matching source query into one `DELETE`/`UPDATE` statement, using
//! only ANSI constructs (`IN (subquery)`, `EXISTS`). Rows are never loaded
//! into memory.

pub mod delete;
mod selection;
pub mod update;

pub use delete::BulkDelete;
pub use update::BulkUpdate;

use asupersync::{Cx, Outcome};
use sqlext_core::{ConnectionLease, Error, Statement, StoreExecutor};

/// Execute a row-count statement under the connection ownership rule.
async fn execute_counted<E>(cx: &Cx, executor: &E, statement: &Statement) -> Outcome<u64, Error>
where
    E: StoreExecutor + ?Sized,
{
    tracing::debug!(sql = %statement.sql(), params = statement.param_count(), "Executing bulk statement");

    let lease = match ConnectionLease::acquire(cx, executor).await {
        Outcome::Ok(lease) => lease,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    let outcome = executor.query_result_set(cx, statement).await;
    if let Err(e) = lease.release() {
        tracing::warn!(error = %e, "Failed to close connection after bulk statement");
    }

    match outcome {
        Outcome::Ok(set) => {
            tracing::debug!(rows = set.rows_affected(), "Bulk statement complete");
            Outcome::Ok(set.rows_affected())
        }
        Outcome::Err(e) => Outcome::Err(e),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}
