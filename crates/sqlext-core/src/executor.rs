//! Store execution seam.
//!
//! sqlext never speaks a wire protocol itself. Everything that reaches the
//! database goes through a [`StoreExecutor`], which runs one (possibly
//! combined) statement per round trip and hands back the result sets in
//! submission order.
//!
//! [`ConnectionLease`] implements the connection ownership rule shared by
//! every component: if the connection is closed when work starts, it is
//! opened for the duration of the work and closed again on every exit path;
//! an already-open connection is left alone.

use crate::dialect::Dialect;
use crate::error::{Error, QueryError, QueryErrorKind, Result};
use crate::row::ResultSet;
use crate::statement::Statement;
use asupersync::{Cx, Outcome};
use std::future::Future;

/// Open/closed state of the connection behind an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
}

/// A store connection capable of multi-result round trips.
///
/// All async operations take a `Cx` context for cancellation support.
/// `close` is synchronous so it can run from `Drop` when a round trip is
/// abandoned mid-flight.
///
/// # Example
///
/// ```rust,ignore
/// let combined = Statement::new("SELECT COUNT(*) FROM users;\nSELECT MAX(age) FROM users");
/// let sets = executor.execute_multi_result(&cx, &combined, 2).await.unwrap();
/// assert_eq!(sets.len(), 2);
/// ```
pub trait StoreExecutor: Send + Sync {
    /// Dialect used for placeholder numbering and identifier quoting.
    fn dialect(&self) -> Dialect;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Open the underlying connection.
    fn open(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Close the underlying connection.
    #[allow(clippy::result_large_err)]
    fn close(&self) -> Result<()>;

    /// Execute `statement` as a single round trip and return its result sets
    /// in submission order.
    ///
    /// `expected_sets` is the number of statements the caller combined; it
    /// is a hint for executors that need to know how many sets to read.
    fn execute_multi_result(
        &self,
        cx: &Cx,
        statement: &Statement,
        expected_sets: usize,
    ) -> impl Future<Output = Outcome<Vec<ResultSet>, Error>> + Send;

    /// Execute a single statement and return its only result set.
    fn query_result_set(
        &self,
        cx: &Cx,
        statement: &Statement,
    ) -> impl Future<Output = Outcome<ResultSet, Error>> + Send {
        async move {
            match self.execute_multi_result(cx, statement, 1).await {
                Outcome::Ok(mut sets) => {
                    if sets.len() == 1 {
                        match sets.pop() {
                            Some(set) => Outcome::Ok(set),
                            None => Outcome::Err(result_count_mismatch(statement, 1, 0)),
                        }
                    } else {
                        Outcome::Err(result_count_mismatch(statement, 1, sets.len()))
                    }
                }
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        }
    }
}

/// Error for a round trip that returned the wrong number of result sets.
pub fn result_count_mismatch(statement: &Statement, expected: usize, actual: usize) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Protocol,
        sql: Some(statement.sql().to_string()),
        sqlstate: None,
        message: format!("expected {expected} result set(s), store returned {actual}"),
        source: None,
    })
}

/// Scoped ownership of an executor's connection.
///
/// Created with [`ConnectionLease::acquire`]. Closes the connection when
/// released or dropped, but only if the lease itself opened it.
#[derive(Debug)]
pub struct ConnectionLease<'a, E: StoreExecutor + ?Sized> {
    executor: &'a E,
    opened: bool,
}

impl<'a, E: StoreExecutor + ?Sized> ConnectionLease<'a, E> {
    /// Ensure the connection is open, opening it if necessary.
    pub async fn acquire(cx: &Cx, executor: &'a E) -> Outcome<Self, Error> {
        if executor.state() == ConnectionState::Open {
            return Outcome::Ok(Self {
                executor,
                opened: false,
            });
        }

        match executor.open(cx).await {
            Outcome::Ok(()) => {
                tracing::trace!("Opened connection for round trip");
                Outcome::Ok(Self {
                    executor,
                    opened: true,
                })
            }
            Outcome::Err(e) => {
                tracing::warn!(
                    error = %e,
                    connection_error = e.is_connection_error(),
                    "Failed to open connection for round trip"
                );
                Outcome::Err(e)
            }
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Whether this lease opened the connection (and will close it).
    pub fn opened(&self) -> bool {
        self.opened
    }

    /// Give the connection back, surfacing a close failure to the caller.
    #[allow(clippy::result_large_err)]
    pub fn release(mut self) -> Result<()> {
        if self.opened {
            self.opened = false;
            tracing::trace!("Closing connection opened for round trip");
            return self.executor.close();
        }
        Ok(())
    }
}

impl<E: StoreExecutor + ?Sized> Drop for ConnectionLease<'_, E> {
    fn drop(&mut self) {
        if self.opened {
            if let Err(e) = self.executor.close() {
                tracing::warn!(error = %e, "Failed to close connection after round trip");
            }
        }
    }
}
