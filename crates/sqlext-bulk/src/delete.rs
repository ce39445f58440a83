//! Set-based DELETE.

use crate::selection::{Selection, quote_table};
use asupersync::{Cx, Outcome};
use sqlext_core::{Dialect, Error, Result, Statement, StoreExecutor, Value};

/// Delete every row of a table matching a predicate or a key source, in a
/// single statement.
///
/// # Example
///
/// ```
/// use sqlext_bulk::BulkDelete;
/// use sqlext_core::{Dialect, Statement};
///
/// let stmt = BulkDelete::new("sessions")
///     .matching(
///         Statement::new("SELECT id FROM sessions WHERE expires_at < $1").bind("2024-01-01"),
///         &["id"],
///     )
///     .to_statement(Dialect::Postgres)
///     .unwrap();
///
/// assert_eq!(
///     stmt.sql(),
///     "DELETE FROM \"sessions\" WHERE \"id\" IN (SELECT \"id\" FROM \
///      (SELECT id FROM sessions WHERE expires_at < $1) AS src)"
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BulkDelete {
    table: String,
    selection: Selection,
}

impl BulkDelete {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            selection: Selection::default(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Restrict to rows satisfying `predicate` (numbered from placeholder 1).
    #[must_use]
    pub fn filter(mut self, predicate: impl Into<String>, params: Vec<Value>) -> Self {
        self.selection
            .filter(Statement::with_params(predicate, params));
        self
    }

    /// Restrict to rows whose key columns appear in the result of `source`.
    ///
    /// `source` must select the key columns by the same names.
    #[must_use]
    pub fn matching(mut self, source: Statement, key_columns: &[&str]) -> Self {
        self.selection.matching(source, key_columns);
        self
    }

    /// Allow the statement to run without any filter.
    #[must_use]
    pub fn all_rows(mut self) -> Self {
        self.selection.allow_all_rows();
        self
    }

    /// Render the DELETE for `dialect`.
    #[allow(clippy::result_large_err)]
    pub fn to_statement(&self, dialect: Dialect) -> Result<Statement> {
        let target = quote_table(dialect, &self.table);
        let mut params = Vec::new();
        let clause = self
            .selection
            .render(dialect, &target, "DELETE", &mut params)?;
        Ok(Statement::with_params(
            format!("DELETE FROM {target}{clause}"),
            params,
        ))
    }

    /// Run the DELETE and return the number of rows removed.
    #[tracing::instrument(level = "debug", skip(self, cx, executor), fields(table = %self.table))]
    pub async fn execute<E>(&self, cx: &Cx, executor: &E) -> Outcome<u64, Error>
    where
        E: StoreExecutor + ?Sized,
    {
        let statement = match self.to_statement(executor.dialect()) {
            Ok(statement) => statement,
            Err(e) => return Outcome::Err(e),
        };
        crate::execute_counted(cx, executor, &statement).await
    }
}
