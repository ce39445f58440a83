//! One unit of work: deferred queries, cached reads and bulk writes against
//! a single executor.

use crate::config::ExtConfig;
use asupersync::{Cx, Outcome};
use sqlext_bulk::{BulkDelete, BulkUpdate};
use sqlext_cache::{CachePolicy, QueryCache};
use sqlext_core::{Error, FromRow, FromValue, ResultSet, Result, Statement, StoreExecutor};
use sqlext_future::{BatchRegistry, DeferredResult, FutureScope};
use std::fmt;
use std::sync::Arc;

/// Bundles an executor with its future scope and a result cache.
///
/// Dropping the context closes its scope, discarding deferred queries that
/// were never resolved.
///
/// # Example
///
/// ```rust,ignore
/// let ctx = ExtContext::new(Arc::new(conn));
///
/// let adults = ctx.future_count(Statement::new("SELECT COUNT(*) FROM heroes WHERE age >= $1").bind(18))?;
/// let oldest = ctx.future_scalar::<i64>(Statement::new("SELECT MAX(age) FROM heroes"))?;
///
/// // One round trip
/// let adults = adults.resolve(&cx).await.unwrap();
/// let oldest = oldest.resolve(&cx).await.unwrap();
///
/// let archived = ctx
///     .bulk_update(&cx, &ctx.update("heroes").set("archived", true).filter("age > $1", vec![100.into()]))
///     .await
///     .unwrap();
/// ```
pub struct ExtContext<E: StoreExecutor> {
    config: ExtConfig,
    executor: Arc<E>,
    scope: FutureScope<E>,
    cache: Arc<QueryCache>,
}

impl<E: StoreExecutor> ExtContext<E> {
    /// Create a context with the default configuration.
    pub fn new(executor: Arc<E>) -> Self {
        Self::with_config(executor, ExtConfig::default())
    }

    /// Create a context with its own registry and cache.
    pub fn with_config(executor: Arc<E>, config: ExtConfig) -> Self {
        Self::with_registry(executor, Arc::new(BatchRegistry::new()), config)
    }

    /// Create a context whose scope lives on a shared registry.
    pub fn with_registry(
        executor: Arc<E>,
        registry: Arc<BatchRegistry<E>>,
        config: ExtConfig,
    ) -> Self {
        let cache = Arc::new(QueryCache::new(config.cache_capacity));
        let scope = FutureScope::new(Arc::clone(&executor), registry);
        tracing::debug!(scope = %scope.id(), cache_capacity = config.cache_capacity, "Opened sqlext context");
        Self {
            config,
            executor,
            scope,
            cache,
        }
    }

    /// Share `cache` with other contexts instead of the private one.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<QueryCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &ExtConfig {
        &self.config
    }

    pub fn executor(&self) -> &Arc<E> {
        &self.executor
    }

    pub fn scope(&self) -> &FutureScope<E> {
        &self.scope
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    // ==================== Deferred queries ====================

    #[allow(clippy::result_large_err)]
    pub fn future<T, F>(&self, statement: Statement, project: F) -> Result<DeferredResult<T, E>>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResultSet) -> Result<T> + Send + Sync + 'static,
    {
        self.scope.defer(statement, project)
    }

    #[allow(clippy::result_large_err)]
    pub fn future_list<M>(&self, statement: Statement) -> Result<DeferredResult<Vec<M>, E>>
    where
        M: FromRow + Send + Sync + 'static,
    {
        self.scope.defer_list(statement)
    }

    #[allow(clippy::result_large_err)]
    pub fn future_first<M>(&self, statement: Statement) -> Result<DeferredResult<Option<M>, E>>
    where
        M: FromRow + Send + Sync + 'static,
    {
        self.scope.defer_first(statement)
    }

    #[allow(clippy::result_large_err)]
    pub fn future_scalar<V>(&self, statement: Statement) -> Result<DeferredResult<V, E>>
    where
        V: FromValue + Send + Sync + 'static,
    {
        self.scope.defer_scalar(statement)
    }

    #[allow(clippy::result_large_err)]
    pub fn future_count(&self, statement: Statement) -> Result<DeferredResult<i64, E>> {
        self.scope.defer_count(statement)
    }

    /// Execute every deferred query that has not run yet.
    pub async fn flush(&self, cx: &Cx) -> Outcome<(), Error> {
        self.scope.flush(cx).await
    }

    // ==================== Cached queries ====================

    /// Read through the cache using the configured default policy.
    pub async fn from_cache<T, F>(
        &self,
        cx: &Cx,
        statement: &Statement,
        project: F,
    ) -> Outcome<Arc<T>, Error>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&ResultSet) -> Result<T>,
    {
        self.from_cache_with(cx, statement, self.config.default_cache_policy(), project)
            .await
    }

    /// Read through the cache with an explicit policy.
    pub async fn from_cache_with<T, F>(
        &self,
        cx: &Cx,
        statement: &Statement,
        policy: CachePolicy,
        project: F,
    ) -> Outcome<Arc<T>, Error>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&ResultSet) -> Result<T>,
    {
        if self.config.log_sql {
            tracing::info!(sql = %statement.sql(), "Cached query");
        }
        self.cache
            .get_or_execute(cx, self.executor.as_ref(), statement, policy, project)
            .await
    }

    /// Drop every cached result tagged `tag`.
    pub fn expire_tag(&self, tag: &str) -> usize {
        self.cache.expire_tag(tag)
    }

    // ==================== Bulk statements ====================

    /// Start a bulk DELETE on `table`.
    #[allow(clippy::unused_self)]
    pub fn delete(&self, table: impl Into<String>) -> BulkDelete {
        BulkDelete::new(table)
    }

    /// Start a bulk UPDATE on `table`.
    #[allow(clippy::unused_self)]
    pub fn update(&self, table: impl Into<String>) -> BulkUpdate {
        BulkUpdate::new(table)
    }

    pub async fn bulk_delete(&self, cx: &Cx, delete: &BulkDelete) -> Outcome<u64, Error> {
        if self.config.log_sql {
            if let Ok(statement) = delete.to_statement(self.executor.dialect()) {
                tracing::info!(sql = %statement.sql(), "Bulk delete");
            }
        }
        delete.execute(cx, self.executor.as_ref()).await
    }

    pub async fn bulk_update(&self, cx: &Cx, update: &BulkUpdate) -> Outcome<u64, Error> {
        if self.config.log_sql {
            if let Ok(statement) = update.to_statement(self.executor.dialect()) {
                tracing::info!(sql = %statement.sql(), "Bulk update");
            }
        }
        update.execute(cx, self.executor.as_ref()).await
    }
}

impl<E: StoreExecutor> fmt::Debug for ExtContext<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtContext")
            .field("config", &self.config)
            .field("scope", &self.scope)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
