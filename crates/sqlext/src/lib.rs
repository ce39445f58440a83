//! sqlext - deferred query batching, result caching and bulk statements
//! for SQL ORMs.
//!
//! sqlext sits between an ORM's query builder and its connection:
//!
//! - **Future queries**: defer many reads, pay for one round trip when the
//!   first one is needed
//! - **Query cache**: serve repeated reads from memory with absolute or
//!   sliding expiration and tag invalidation
//! - **Bulk statements**: set-based `DELETE`/`UPDATE` without loading rows
//!
//! The ORM plugs in through two traits: [`QueryTranslator`] turns its query
//! representation into a [`Statement`], and [`StoreExecutor`] runs
//! statements against its connection.
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlext::prelude::*;
//!
//! async fn dashboard(cx: &Cx, conn: Arc<impl StoreExecutor>) -> Result<()> {
//!     let ctx = ExtContext::new(conn);
//!
//!     let users = ctx.future_count(Statement::new("SELECT COUNT(*) FROM users"))?;
//!     let latest = ctx.future_list::<(i64, String)>(
//!         Statement::new("SELECT id, title FROM posts ORDER BY id DESC LIMIT $1").bind(10),
//!     )?;
//!
//!     // Both statements run in one round trip.
//!     let latest = latest.resolve(cx).await.unwrap();
//!     let users = users.resolve(cx).await.unwrap();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;

pub use config::ExtConfig;
pub use context::ExtContext;

pub use sqlext_bulk::{BulkDelete, BulkUpdate};
pub use sqlext_cache::{CacheKey, CachePolicy, CacheStats, Expiration, QueryCache};
pub use sqlext_core::{
    BatchError, BatchErrorKind, ColumnInfo, ConnectionError, ConnectionErrorKind, ConnectionLease,
    ConnectionState, Cx, Dialect, Error, FromRow, FromValue, Outcome, Passthrough, QueryError,
    QueryErrorKind, QueryTranslator, Result, ResultSet, Row, Statement, StoreExecutor, TypeError,
    Value,
};
pub use sqlext_future::{
    BatchRegistry, DeferredResult, FutureQueryBatch, FutureScope, QueryDescriptor, ScopeId,
    combine_statements,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        BulkDelete, BulkUpdate, CachePolicy, Cx, DeferredResult, Error, ExtConfig, ExtContext,
        FromRow, FromValue, FutureScope, Outcome, QueryCache, QueryTranslator, Result, ResultSet,
        Row, Statement, StoreExecutor, Value,
    };
    pub use std::sync::Arc;
}
