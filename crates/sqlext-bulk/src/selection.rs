//! WHERE-clause rendering shared by bulk DELETE and UPDATE.

use sqlext_core::{Dialect, Error, Result, Statement, Value};

#[derive(Debug, Clone, PartialEq)]
struct KeyMatch {
    source: Statement,
    keys: Vec<String>,
}

/// Which rows a bulk statement targets.
///
/// Conditions are ANDed together. An empty selection is refused unless
/// every row was explicitly requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Selection {
    predicates: Vec<Statement>,
    matches: Vec<KeyMatch>,
    all_rows: bool,
}

impl Selection {
    pub(crate) fn filter(&mut self, predicate: Statement) {
        self.predicates.push(predicate);
    }

    pub(crate) fn matching(&mut self, source: Statement, key_columns: &[&str]) {
        self.matches.push(KeyMatch {
            source,
            keys: key_columns.iter().map(|k| (*k).to_string()).collect(),
        });
    }

    pub(crate) fn allow_all_rows(&mut self) {
        self.all_rows = true;
    }

    pub(crate) fn is_unfiltered(&self) -> bool {
        self.predicates.is_empty() && self.matches.is_empty()
    }

    /// Render ` WHERE ...` (or nothing for an explicit all-rows statement),
    /// appending parameters to `params` and numbering placeholders after
    /// the ones already there.
    #[allow(clippy::result_large_err)]
    pub(crate) fn render(
        &self,
        dialect: Dialect,
        target: &str,
        verb: &str,
        params: &mut Vec<Value>,
    ) -> Result<String> {
        if self.is_unfiltered() {
            if self.all_rows {
                return Ok(String::new());
            }
            return Err(Error::Custom(format!(
                "refusing to {verb} every row of {target} without a filter; call all_rows() to allow it"
            )));
        }

        let grouped = self.predicates.len() + self.matches.len() > 1;
        let mut conditions = Vec::with_capacity(self.predicates.len() + self.matches.len());

        for predicate in &self.predicates {
            let sql = append(dialect, predicate, params);
            conditions.push(if grouped { format!("({sql})") } else { sql });
        }

        for m in &self.matches {
            let source = append(dialect, &m.source, params);
            match m.keys.as_slice() {
                [] => {
                    return Err(Error::Custom(format!(
                        "key-matching {verb} on {target} needs at least one key column"
                    )));
                }
                [key] => {
                    let key = dialect.quote_identifier(key);
                    conditions.push(format!("{key} IN (SELECT {key} FROM ({source}) AS src)"));
                }
                keys => {
                    let correlated = keys
                        .iter()
                        .map(|k| {
                            let k = dialect.quote_identifier(k);
                            format!("src.{k} = {target}.{k}")
                        })
                        .collect::<Vec<_>>()
                        .join(" AND ");
                    conditions.push(format!(
                        "EXISTS (SELECT 1 FROM ({source}) AS src WHERE {correlated})"
                    ));
                }
            }
        }

        Ok(format!(" WHERE {}", conditions.join(" AND ")))
    }
}

/// Shift `stmt` past the collected parameters and collect its own.
fn append(dialect: Dialect, stmt: &Statement, params: &mut Vec<Value>) -> String {
    let sql = dialect.embed(stmt.sql(), params.len());
    params.extend(stmt.params().iter().cloned());
    sql
}

/// Quote a possibly schema-qualified table name.
pub(crate) fn quote_table(dialect: Dialect, table: &str) -> String {
    table
        .split('.')
        .map(|part| dialect.quote_identifier(part))
        .collect::<Vec<_>>()
        .join(".")
}
