//! Unit-of-work scopes that own one pending batch at a time.

use crate::batch::FutureQueryBatch;
use crate::descriptor::QueryDescriptor;
use crate::handle::DeferredResult;
use crate::registry::{BatchRegistry, ScopeId};
use asupersync::{Cx, Outcome};
use sqlext_core::{
    Error, FromRow, FromValue, QueryTranslator, ResultSet, Result, Statement, StoreExecutor,
};
use std::fmt;
use std::sync::Arc;

/// Entry point for deferring queries within one unit of work.
///
/// Every deferral made through the same scope lands in the scope's current
/// batch until that batch materializes; the next deferral then starts a new
/// batch. Dropping the scope discards a batch that never ran.
///
/// # Example
///
/// ```rust,ignore
/// let scope = FutureScope::standalone(Arc::new(executor));
/// let total = scope.defer_count(Statement::new("SELECT COUNT(*) FROM orders"))?;
/// let recent = scope.defer_list::<(i64, String)>(
///     Statement::new("SELECT id, status FROM orders WHERE placed_at > $1").bind(cutoff),
/// )?;
///
/// // One round trip runs both statements.
/// let recent = recent.resolve(&cx).await.unwrap();
/// let total = total.resolve(&cx).await.unwrap();
/// ```
pub struct FutureScope<E: StoreExecutor> {
    id: ScopeId,
    executor: Arc<E>,
    registry: Arc<BatchRegistry<E>>,
}

impl<E: StoreExecutor> FutureScope<E> {
    /// Open a scope with a fresh id on a shared registry.
    pub fn new(executor: Arc<E>, registry: Arc<BatchRegistry<E>>) -> Self {
        Self::with_id(ScopeId::next(), executor, registry)
    }

    /// Open a scope with its own private registry.
    pub fn standalone(executor: Arc<E>) -> Self {
        Self::new(executor, Arc::new(BatchRegistry::new()))
    }

    pub fn with_id(id: ScopeId, executor: Arc<E>, registry: Arc<BatchRegistry<E>>) -> Self {
        Self {
            id,
            executor,
            registry,
        }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn executor(&self) -> &Arc<E> {
        &self.executor
    }

    pub fn registry(&self) -> &Arc<BatchRegistry<E>> {
        &self.registry
    }

    /// Add `descriptor` to the scope's current batch.
    #[allow(clippy::result_large_err)]
    pub fn defer_descriptor<T>(&self, descriptor: QueryDescriptor) -> Result<DeferredResult<T, E>>
    where
        T: Send + Sync + 'static,
    {
        let batch = self.registry.get_or_create(self.id, &self.executor);
        batch.defer(descriptor)
    }

    /// Defer `statement`, projecting its result set with `project`.
    #[allow(clippy::result_large_err)]
    pub fn defer<T, F>(&self, statement: Statement, project: F) -> Result<DeferredResult<T, E>>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResultSet) -> Result<T> + Send + Sync + 'static,
    {
        self.defer_descriptor(QueryDescriptor::new(statement, project))
    }

    /// Defer a query returning every row.
    #[allow(clippy::result_large_err)]
    pub fn defer_list<M>(&self, statement: Statement) -> Result<DeferredResult<Vec<M>, E>>
    where
        M: FromRow + Send + Sync + 'static,
    {
        self.defer_descriptor(QueryDescriptor::list::<M>(statement))
    }

    /// Defer a query returning its first row, if any.
    #[allow(clippy::result_large_err)]
    pub fn defer_first<M>(&self, statement: Statement) -> Result<DeferredResult<Option<M>, E>>
    where
        M: FromRow + Send + Sync + 'static,
    {
        self.defer_descriptor(QueryDescriptor::first::<M>(statement))
    }

    #[allow(clippy::result_large_err)]
    pub fn defer_scalar<V>(&self, statement: Statement) -> Result<DeferredResult<V, E>>
    where
        V: FromValue + Send + Sync + 'static,
    {
        self.defer_descriptor(QueryDescriptor::scalar::<V>(statement))
    }

    #[allow(clippy::result_large_err)]
    pub fn defer_count(&self, statement: Statement) -> Result<DeferredResult<i64, E>> {
        self.defer_descriptor(QueryDescriptor::count(statement))
    }

    /// Translate `query` for the executor's dialect and defer it.
    #[allow(clippy::result_large_err)]
    pub fn defer_query<Q, Tr, T, F>(
        &self,
        translator: &Tr,
        query: &Q,
        project: F,
    ) -> Result<DeferredResult<T, E>>
    where
        Q: ?Sized,
        Tr: QueryTranslator<Q>,
        T: Send + Sync + 'static,
        F: Fn(&ResultSet) -> Result<T> + Send + Sync + 'static,
    {
        let statement = translator.translate(query, self.executor.dialect())?;
        self.defer(statement, project)
    }

    /// The scope's batch that has not run yet, if any.
    pub fn pending(&self) -> Option<Arc<FutureQueryBatch<E>>> {
        self.registry.get(self.id)
    }

    /// Materialize the pending batch now, if there is one.
    pub async fn flush(&self, cx: &Cx) -> Outcome<(), Error> {
        match self.pending() {
            Some(batch) => batch.materialize(cx).await,
            None => Outcome::Ok(()),
        }
    }

    /// End the scope, discarding a batch that never ran.
    pub fn close(self) {
        drop(self);
    }
}

impl<E: StoreExecutor> Drop for FutureScope<E> {
    fn drop(&mut self) {
        if let Some(batch) = self.registry.remove(self.id) {
            if batch.discard() {
                tracing::debug!(scope = %self.id, batch = batch.id(), "Scope closed with pending batch");
            }
        }
    }
}

impl<E: StoreExecutor> fmt::Debug for FutureScope<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureScope")
            .field("id", &self.id)
            .field("pending", &self.pending().map(|b| b.len()))
            .finish_non_exhaustive()
    }
}
