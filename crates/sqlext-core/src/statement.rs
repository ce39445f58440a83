//! Compiled SQL statements.

use crate::dialect::Dialect;
use crate::error::Result;
use crate::value::Value;
use std::hash::{DefaultHasher, Hash, Hasher};

/// SQL text plus its positional parameters.
///
/// This is the unit every sqlext component consumes: deferred batches
/// concatenate statements, the result cache keys on their fingerprint and
/// bulk builders produce them.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
}

impl Statement {
    /// Create a statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Create a statement with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Append one parameter (builder pattern).
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Split into SQL text and parameters.
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }

    /// Stable hash of the SQL text and every parameter.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.sql.hash(&mut hasher);
        self.params.len().hash(&mut hasher);
        for value in &self.params {
            value.hash_into(&mut hasher);
        }
        hasher.finish()
    }
}

/// Turns a host query representation into a [`Statement`].
///
/// This is the seam where an ORM's own query builder plugs in; sqlext
/// never parses or validates query semantics itself.
pub trait QueryTranslator<Q: ?Sized>: Send + Sync {
    #[allow(clippy::result_large_err)]
    fn translate(&self, query: &Q, dialect: Dialect) -> Result<Statement>;
}

/// Translator for queries that are already statements.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl QueryTranslator<Statement> for Passthrough {
    fn translate(&self, query: &Statement, _dialect: Dialect) -> Result<Statement> {
        Ok(query.clone())
    }
}

impl QueryTranslator<str> for Passthrough {
    fn translate(&self, query: &str, _dialect: Dialect) -> Result<Statement> {
        Ok(Statement::new(query))
    }
}
