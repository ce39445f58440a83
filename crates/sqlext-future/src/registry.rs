//! Scope-keyed registry of pending batches.

use crate::batch::FutureQueryBatch;
use sqlext_core::StoreExecutor;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a unit of work that owns at most one pending batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Allocate a process-unique scope id.
    pub fn next() -> Self {
        Self(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ScopeId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

/// Maps each scope to its current pending batch.
///
/// At most one batch is registered per scope. A batch removes itself once it
/// has materialized, so the next deferral in the same scope starts a fresh
/// batch. The registry is shared explicitly (`Arc<BatchRegistry<E>>`); there
/// is no ambient global instance.
pub struct BatchRegistry<E: StoreExecutor> {
    batches: Mutex<HashMap<ScopeId, Arc<FutureQueryBatch<E>>>>,
}

impl<E: StoreExecutor> BatchRegistry<E> {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ScopeId, Arc<FutureQueryBatch<E>>>> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the scope's pending batch, creating and registering one bound
    /// to `executor` if none exists.
    ///
    /// A registered batch that already materialized or was discarded is
    /// replaced. Never creates two live batches for the same scope.
    pub fn get_or_create(
        self: &Arc<Self>,
        scope: ScopeId,
        executor: &Arc<E>,
    ) -> Arc<FutureQueryBatch<E>> {
        let mut entries = self.entries();
        if let Some(batch) = entries.get(&scope) {
            if !batch.is_finished() {
                return Arc::clone(batch);
            }
            tracing::trace!(scope = %scope, batch = batch.id(), "Replacing finished batch");
        }

        let batch = Arc::new(FutureQueryBatch::registered(
            scope,
            Arc::clone(executor),
            Arc::downgrade(self),
        ));
        tracing::trace!(scope = %scope, batch = batch.id(), "Registered new batch");
        entries.insert(scope, Arc::clone(&batch));
        batch
    }

    /// The scope's pending batch, if any.
    pub fn get(&self, scope: ScopeId) -> Option<Arc<FutureQueryBatch<E>>> {
        self.entries().get(&scope).cloned()
    }

    /// Unregister the scope's batch. No-op when nothing is registered.
    pub fn remove(&self, scope: ScopeId) -> Option<Arc<FutureQueryBatch<E>>> {
        self.entries().remove(&scope)
    }

    /// Unregister `batch` only if it is still the scope's registered batch.
    pub(crate) fn remove_batch(&self, batch: &FutureQueryBatch<E>) -> bool {
        let mut entries = self.entries();
        let current = entries
            .get(&batch.scope())
            .is_some_and(|registered| std::ptr::eq(Arc::as_ptr(registered), batch));
        if current {
            entries.remove(&batch.scope());
            tracing::trace!(scope = %batch.scope(), batch = batch.id(), "Unregistered batch");
        }
        current
    }

    /// Number of scopes with a pending batch.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Unregister and discard every pending batch.
    ///
    /// Returns how many batches were dropped.
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = self.entries().drain().map(|(_, batch)| batch).collect();
        for batch in &drained {
            batch.discard();
        }
        if !drained.is_empty() {
            tracing::debug!(batches = drained.len(), "Cleared batch registry");
        }
        drained.len()
    }
}

impl<E: StoreExecutor> Default for BatchRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: StoreExecutor> fmt::Debug for BatchRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchRegistry")
            .field("scopes", &self.len())
            .finish()
    }
}
