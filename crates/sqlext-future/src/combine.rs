//! Concatenation of pending statements into one round trip.

use sqlext_core::{Dialect, Statement};

/// Combine `statements` into a single multi-statement request.
///
/// Order is preserved exactly: statement `k` of the input produces result
/// set `k` of the round trip. Each statement is embedded with
/// [`Dialect::embed`]: trailing semicolons are trimmed, a trailing `--`
/// comment is closed with a newline, and numbered placeholders are shifted
/// past the parameters of the statements before it.
pub fn combine_statements<'a, I>(dialect: Dialect, statements: I) -> Statement
where
    I: IntoIterator<Item = &'a Statement>,
{
    let mut sql = String::new();
    let mut params = Vec::new();

    for (i, stmt) in statements.into_iter().enumerate() {
        if i > 0 {
            sql.push_str(dialect.statement_separator());
        }
        sql.push_str(&dialect.embed(stmt.sql(), params.len()));
        params.extend(stmt.params().iter().cloned());
    }

    Statement::with_params(sql, params)
}
