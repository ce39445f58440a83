//! Pending query descriptors.

use sqlext_core::{FromRow, FromValue, ResultSet, Result, Statement};
use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

/// Type-erased projection output stored in a materialized batch.
pub(crate) type Projected = Arc<dyn Any + Send + Sync>;

type ProjectFn = Box<dyn Fn(&ResultSet) -> Result<Projected> + Send + Sync>;

/// A statement plus the projector that turns its result set into a value.
///
/// Immutable once built. Adding it to a batch moves it into the batch,
/// which owns it exclusively from then on.
pub struct QueryDescriptor {
    statement: Statement,
    projector: ProjectFn,
    output_type: TypeId,
    output_name: &'static str,
}

impl QueryDescriptor {
    /// Describe a query whose result set is projected by `project`.
    pub fn new<T, F>(statement: Statement, project: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResultSet) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            statement,
            projector: Box::new(move |set| project(set).map(|v| Arc::new(v) as Projected)),
            output_type: TypeId::of::<T>(),
            output_name: type_name::<T>(),
        }
    }

    /// Every row, decoded through [`FromRow`].
    pub fn list<M>(statement: Statement) -> Self
    where
        M: FromRow + Send + Sync + 'static,
    {
        Self::new(statement, ResultSet::decode_all::<M>)
    }

    /// The first row, if any.
    pub fn first<M>(statement: Statement) -> Self
    where
        M: FromRow + Send + Sync + 'static,
    {
        Self::new(statement, ResultSet::decode_first::<M>)
    }

    /// First column of the first row.
    pub fn scalar<V>(statement: Statement) -> Self
    where
        V: FromValue + Send + Sync + 'static,
    {
        Self::new(statement, ResultSet::scalar::<V>)
    }

    /// A `COUNT(*)`-style scalar read as `i64`.
    pub fn count(statement: Statement) -> Self {
        Self::scalar::<i64>(statement)
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    /// Rust type name of the projected value.
    pub fn output_type_name(&self) -> &'static str {
        self.output_name
    }

    /// Whether this descriptor projects into `T`.
    pub fn produces<T: 'static>(&self) -> bool {
        self.output_type == TypeId::of::<T>()
    }

    #[allow(clippy::result_large_err)]
    pub(crate) fn project(&self, set: &ResultSet) -> Result<Projected> {
        (self.projector)(set)
    }
}

impl fmt::Debug for QueryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryDescriptor")
            .field("statement", &self.statement)
            .field("output", &self.output_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlext_core::Value;

    fn counts() -> ResultSet {
        ResultSet::from_values(vec!["count".to_string()], vec![vec![Value::BigInt(12)]])
    }

    #[test]
    fn test_count_projects_scalar() {
        let desc = QueryDescriptor::count(Statement::new("SELECT COUNT(*) FROM users"));
        assert!(desc.produces::<i64>());
        assert!(!desc.produces::<i32>());

        let out = desc.project(&counts()).unwrap();
        assert_eq!(out.downcast_ref::<i64>(), Some(&12));
    }

    #[test]
    fn test_list_and_first() {
        let set = ResultSet::from_values(
            vec!["id".to_string(), "name".to_string()],
            vec![
                vec![Value::BigInt(1), Value::Text("a".into())],
                vec![Value::BigInt(2), Value::Text("b".into())],
            ],
        );

        let list = QueryDescriptor::list::<(i64, String)>(Statement::new("SELECT id, name FROM t"));
        let out = list.project(&set).unwrap();
        assert_eq!(
            out.downcast_ref::<Vec<(i64, String)>>().map(Vec::len),
            Some(2)
        );

        let first =
            QueryDescriptor::first::<(i64, String)>(Statement::new("SELECT id, name FROM t"));
        let out = first.project(&set).unwrap();
        assert_eq!(
            out.downcast_ref::<Option<(i64, String)>>(),
            Some(&Some((1, "a".to_string())))
        );
    }

    #[test]
    fn test_projection_error_surfaces() {
        let desc = QueryDescriptor::scalar::<String>(Statement::new("SELECT COUNT(*) FROM t"));
        assert!(desc.project(&counts()).is_err());
        assert!(desc.output_type_name().contains("String"));
    }
}
