//! Set-based UPDATE.

use crate::selection::{Selection, quote_table};
use asupersync::{Cx, Outcome};
use sqlext_core::{Dialect, Error, Result, Statement, StoreExecutor, Value};

#[derive(Debug, Clone, PartialEq)]
enum Assignment {
    Value(String, Value),
    Expr(String, String),
}

/// Update every row of a table matching a predicate or a key source, in a
/// single statement.
///
/// SET parameters are numbered first; filter and source placeholders follow.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkUpdate {
    table: String,
    assignments: Vec<Assignment>,
    selection: Selection,
}

impl BulkUpdate {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            assignments: Vec::new(),
            selection: Selection::default(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Assign a bound value to `column`.
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments.push(Assignment::Value(column.into(), value.into()));
        self
    }

    /// Assign a SQL expression to `column`, e.g. `"visits + 1"`.
    #[must_use]
    pub fn set_expr(mut self, column: impl Into<String>, sql: impl Into<String>) -> Self {
        self.assignments.push(Assignment::Expr(column.into(), sql.into()));
        self
    }

    #[must_use]
    pub fn filter(mut self, predicate: impl Into<String>, params: Vec<Value>) -> Self {
        self.selection.filter(Statement::with_params(predicate, params));
        self
    }

    #[must_use]
    pub fn matching(mut self, source: Statement, key_columns: &[&str]) -> Self {
        self.selection.matching(source, key_columns);
        self
    }

    #[must_use]
    pub fn all_rows(mut self) -> Self {
        self.selection.allow_all_rows();
        self
    }

    /// Render the UPDATE for `dialect`.
    #[allow(clippy::result_large_err)]
    pub fn to_statement(&self, dialect: Dialect) -> Result<Statement> {
        let target = quote_table(dialect, &self.table);
        if self.assignments.is_empty() {
            return Err(Error::Custom(format!("UPDATE of {target} has no SET clause")));
        }

        let mut params = Vec::new();
        let set_clause = self
            .assignments
            .iter()
            .map(|assignment| match assignment {
                Assignment::Value(column, value) => {
                    params.push(value.clone());
                    format!(
                        "{} = {}",
                        dialect.quote_identifier(column),
                        dialect.placeholder(params.len())
                    )
                }
                Assignment::Expr(column, sql) => {
                    format!("{} = {}", dialect.quote_identifier(column), sql)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        let clause = self
            .selection
            .render(dialect, &target, "UPDATE", &mut params)?;
        Ok(Statement::with_params(
            format!("UPDATE {target} SET {set_clause}{clause}"),
            params,
        ))
    }

    /// Run the UPDATE and return the number of rows changed.
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
