//! Core types and traits for sqlext.
//!
//! This crate provides the abstractions every sqlext component shares:
//!
//! - `Value`, `Row` and `ResultSet` for dynamically typed results
//! - `Statement` (SQL text + parameters) and the `QueryTranslator` seam
//! - `StoreExecutor`, the multi-result round trip a store must provide
//! - `ConnectionLease` for open-if-closed connection ownership
//! - `Error` with the batch error kinds used by deferred queries
//! - `Outcome` and `Cx` re-exported from asupersync for cancel-correct operations

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod dialect;
pub mod error;
pub mod executor;
pub mod row;
pub mod statement;
pub mod value;

pub use dialect::Dialect;
pub use error::{
    BatchError, BatchErrorKind, ConnectionError, ConnectionErrorKind, Error, QueryError,
    QueryErrorKind, Result, TypeError,
};
pub use executor::{ConnectionLease, ConnectionState, StoreExecutor, result_count_mismatch};
pub use row::{ColumnInfo, FromRow, FromValue, ResultSet, Row};
pub use statement::{Passthrough, QueryTranslator, Statement};
pub use value::Value;
