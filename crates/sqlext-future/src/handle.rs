//! Typed handles to deferred results.

use crate::batch::FutureQueryBatch;
use asupersync::{Cx, Outcome};
use sqlext_core::{BatchError, Error, Result, StoreExecutor};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// The future value of one deferred query.
///
/// A handle keeps its batch alive; the batch never refers back to its
/// handles. Resolving any handle of a batch materializes the whole batch in
/// a single round trip, after which every sibling resolves from the recorded
/// results without touching the store again.
pub struct DeferredResult<T, E: StoreExecutor> {
    batch: Arc<FutureQueryBatch<E>>,
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T, E> DeferredResult<T, E>
where
    T: Send + Sync + 'static,
    E: StoreExecutor,
{
    pub(crate) fn new(batch: Arc<FutureQueryBatch<E>>, index: usize) -> Self {
        Self {
            batch,
            index,
            _marker: PhantomData,
        }
    }

    /// Position of the query within its batch.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn batch(&self) -> &Arc<FutureQueryBatch<E>> {
        &self.batch
    }

    /// Whether the batch has already run.
    pub fn is_resolved(&self) -> bool {
        self.batch.is_materialized()
    }

    /// The recorded outcome, without triggering execution.
    ///
    /// `None` while the batch is still pending.
    pub fn try_get(&self) -> Option<Result<Arc<T>>> {
        if self.is_resolved() {
            Some(self.read())
        } else {
            None
        }
    }

    /// Produce the value, materializing the batch first if needed.
    ///
    /// Repeated calls return the same `Arc` without another round trip. A
    /// store failure resolves as a `StoreExecution` batch error, a failed
    /// projection as `Projection`; a discarded batch yields `InvalidState`.
    /// Cancellation leaves the batch pending so the call can be retried.
    pub async fn resolve(&self, cx: &Cx) -> Outcome<Arc<T>, Error> {
        if !self.batch.is_materialized() {
            match self.batch.materialize(cx).await {
                Outcome::Ok(()) => {}
                // Store failures are recorded per descriptor; report ours below.
                Outcome::Err(e) => {
                    if !self.batch.is_materialized() {
                        return Outcome::Err(e);
                    }
                }
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }

        match self.read() {
            Ok(value) => Outcome::Ok(value),
            Err(e) => Outcome::Err(e),
        }
    }

    #[allow(clippy::result_large_err)]
    fn read(&self) -> Result<Arc<T>> {
        let value = self.batch.result_at(self.index)?;
        value.downcast::<T>().map_err(|_| {
            Error::Batch(BatchError::invalid_state(format!(
                "batch result {} is not a {}",
                self.index,
                std::any::type_name::<T>()
            )))
        })
    }
}

impl<T, E: StoreExecutor> Clone for DeferredResult<T, E> {
    fn clone(&self) -> Self {
        Self {
            batch: Arc::clone(&self.batch),
            index: self.index,
            _marker: PhantomData,
        }
    }
}

impl<T, E: StoreExecutor> fmt::Debug for DeferredResult<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredResult")
            .field("batch", &self.batch.id())
            .field("index", &self.index)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}
