//! A pending batch of deferred queries and its one-shot materialization.

use crate::combine::combine_statements;
use crate::descriptor::{Projected, QueryDescriptor};
use crate::handle::DeferredResult;
use crate::registry::{BatchRegistry, ScopeId};
use asupersync::{Cx, Outcome};
use sqlext_core::{
    BatchError, BatchErrorKind, ConnectionLease, Error, ResultSet, Result, Statement,
    StoreExecutor, result_count_mismatch,
};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

static NEXT_BATCH_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Accepting descriptors.
    Open,
    /// Round trip in flight; frozen.
    Executing,
    /// Results (or failures) recorded for every descriptor.
    Materialized,
    /// Scope ended before materialization.
    Discarded,
}

enum Slot {
    Ready(Projected),
    Failed(BatchErrorKind, Arc<Error>),
}

struct BatchState {
    phase: Phase,
    descriptors: Vec<QueryDescriptor>,
    slots: Vec<Slot>,
}

/// An ordered set of deferred queries executed together in one round trip.
///
/// Descriptors are appended while the batch is open; the first resolve of
/// any handle (or an explicit [`materialize`](Self::materialize)) combines
/// every statement into a single request, runs it, and records one outcome
/// per descriptor. After that the batch is frozen and read-only.
///
/// Concurrent materialize calls are serialized; only the first performs the
/// round trip, later callers observe its results.
pub struct FutureQueryBatch<E: StoreExecutor> {
    id: u64,
    scope: ScopeId,
    executor: Arc<E>,
    registry: Weak<BatchRegistry<E>>,
    state: Mutex<BatchState>,
    exec_lock: asupersync::sync::Mutex<()>,
    round_trips: AtomicUsize,
}

impl<E: StoreExecutor> FutureQueryBatch<E> {
    /// Create an unregistered batch bound to `executor`.
    pub fn new(scope: ScopeId, executor: Arc<E>) -> Self {
        Self::registered(scope, executor, Weak::new())
    }

    pub(crate) fn registered(
        scope: ScopeId,
        executor: Arc<E>,
        registry: Weak<BatchRegistry<E>>,
    ) -> Self {
        Self {
            id: NEXT_BATCH_ID.fetch_add(1, Ordering::Relaxed),
            scope,
            executor,
            registry,
            state: Mutex::new(BatchState {
                phase: Phase::Open,
                descriptors: Vec::new(),
                slots: Vec::new(),
            }),
            exec_lock: asupersync::sync::Mutex::new(()),
            round_trips: AtomicUsize::new(0),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn executor(&self) -> &Arc<E> {
        &self.executor
    }

    /// Number of descriptors in the batch.
    pub fn len(&self) -> usize {
        self.lock_state().descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_materialized(&self) -> bool {
        self.lock_state().phase == Phase::Materialized
    }

    pub fn is_discarded(&self) -> bool {
        self.lock_state().phase == Phase::Discarded
    }

    /// Materialized or discarded: no longer accepts descriptors.
    pub(crate) fn is_finished(&self) -> bool {
        matches!(self.lock_state().phase, Phase::Materialized | Phase::Discarded)
    }

    /// Round trips this batch has performed (0 or 1).
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::Acquire)
    }

    /// Append a descriptor and return its 0-based position.
    ///
    /// Fails with `InvalidState` once the batch is executing, materialized
    /// or discarded.
    #[allow(clippy::result_large_err)]
    pub fn add(&self, descriptor: QueryDescriptor) -> Result<usize> {
        let mut state = self.lock_state();
        match state.phase {
            Phase::Open => {
                let index = state.descriptors.len();
                tracing::trace!(
                    batch = self.id,
                    index,
                    output = descriptor.output_type_name(),
                    "Deferred query"
                );
                state.descriptors.push(descriptor);
                Ok(index)
            }
            Phase::Executing => Err(invalid_state(
                "cannot add a query while the batch is materializing",
            )),
            Phase::Materialized => Err(invalid_state("cannot add a query to a materialized batch")),
            Phase::Discarded => Err(discarded()),
        }
    }

    /// Append a descriptor and return a typed handle to its future result.
    ///
    /// The handle type must match the descriptor's projection; a mismatch is
    /// rejected before anything is added.
    #[allow(clippy::result_large_err)]
    pub fn defer<T>(self: &Arc<Self>, descriptor: QueryDescriptor) -> Result<DeferredResult<T, E>>
    where
        T: Send + Sync + 'static,
    {
        if !descriptor.produces::<T>() {
            return Err(invalid_state(format!(
                "descriptor projects into {}, handle expects {}",
                descriptor.output_type_name(),
                std::any::type_name::<T>()
            )));
        }
        let index = self.add(descriptor)?;
        Ok(DeferredResult::new(Arc::clone(self), index))
    }

    /// Execute every pending descriptor in one round trip.
    ///
    /// - An already materialized batch returns immediately.
    /// - An empty batch is a no-op: no round trip, the batch stays open.
    /// - A store failure is recorded for every descriptor and returned as a
    ///   `StoreExecution` batch error; the batch still counts as
    ///   materialized and leaves the registry.
    /// - A projection failure is recorded for its own descriptor only.
    /// - On cancellation the batch is left open and registered, with no
    ///   partial results, so a later resolve can retry.
    ///
    /// A connection that was closed beforehand is opened for the round trip
    /// and closed again on every exit path.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(batch = self.id, scope = %self.scope))]
    pub async fn materialize(&self, cx: &Cx) -> Outcome<(), Error> {
        if self.is_materialized() {
            return Outcome::Ok(());
        }

        let Ok(_exec) = self.exec_lock.lock(cx).await else {
            return match cx.cancel_reason() {
                Some(reason) => Outcome::Cancelled(reason),
                None => Outcome::Err(invalid_state("failed to acquire batch execution lock")),
            };
        };

        let (combined, count) = {
            let mut state = self.lock_state();
            match state.phase {
                Phase::Open => {}
                Phase::Materialized => return Outcome::Ok(()),
                Phase::Discarded => return Outcome::Err(discarded()),
                Phase::Executing => {
                    return Outcome::Err(invalid_state("batch is already materializing"));
                }
            }
            if state.descriptors.is_empty() {
                tracing::trace!("Empty batch, nothing to execute");
                return Outcome::Ok(());
            }
            state.phase = Phase::Executing;
            let combined = combine_statements(
                self.executor.dialect(),
                state.descriptors.iter().map(QueryDescriptor::statement),
            );
            (combined, state.descriptors.len())
        };

        let executing = ExecutingGuard {
            batch: self,
            armed: true,
        };

        tracing::debug!(
            statements = count,
            params = combined.param_count(),
            "Executing deferred batch"
        );
        tracing::trace!(sql = %combined.sql(), "Combined batch SQL");

        let sets = match self.round_trip(cx, &combined, count).await {
            Outcome::Ok(sets) => Ok(sets),
            Outcome::Err(e) => Err(e),
            Outcome::Cancelled(r) => {
                tracing::debug!("Batch round trip cancelled, batch stays pending");
                return Outcome::Cancelled(r);
            }
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        self.round_trips.fetch_add(1, Ordering::AcqRel);
        let failure = self.record(sets, count);
        executing.disarm();
        self.unregister();

        match failure {
            None => Outcome::Ok(()),
            Some(source) => Outcome::Err(Error::Batch(BatchError {
                kind: BatchErrorKind::StoreExecution,
                message: format!("batch round trip failed: {source}"),
                index: None,
                source: Some(source),
            })),
        }
    }

    async fn round_trip(
        &self,
        cx: &Cx,
        combined: &Statement,
        count: usize,
    ) -> Outcome<Vec<ResultSet>, Error> {
        let lease = match ConnectionLease::acquire(cx, self.executor.as_ref()).await {
            Outcome::Ok(lease) => lease,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let outcome = self
            .executor
            .execute_multi_result(cx, combined, count)
            .await;

        if let Err(e) = lease.release() {
            tracing::warn!(error = %e, "Failed to close connection opened for batch");
        }

        match outcome {
            Outcome::Ok(sets) if sets.len() != count => {
                Outcome::Err(result_count_mismatch(combined, count, sets.len()))
            }
            other => other,
        }
    }

    /// Store one outcome per descriptor and freeze the batch.
    ///
    /// Returns the shared store error when the round trip failed.
    fn record(&self, sets: Result<Vec<ResultSet>>, count: usize) -> Option<Arc<Error>> {
        let mut state = self.lock_state();

        let (slots, failure) = match sets {
            Ok(sets) => {
                let slots = state
                    .descriptors
                    .iter()
                    .zip(&sets)
                    .enumerate()
                    .map(|(index, (descriptor, set))| match descriptor.project(set) {
                        Ok(value) => Slot::Ready(value),
                        Err(e) => {
                            tracing::debug!(index, error = %e, "Projection failed");
                            Slot::Failed(BatchErrorKind::Projection, Arc::new(e))
                        }
                    })
                    .collect();
                (slots, None)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    statements = count,
                    retryable = e.is_retryable(),
                    "Deferred batch round trip failed"
                );
                let shared = Arc::new(e);
                let slots = (0..count)
                    .map(|_| Slot::Failed(BatchErrorKind::StoreExecution, Arc::clone(&shared)))
                    .collect();
                (slots, Some(shared))
            }
        };

        state.slots = slots;
        state.phase = Phase::Materialized;
        failure
    }

    fn unregister(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_batch(self);
        }
    }

    /// Recorded outcome for the descriptor at `index`.
    #[allow(clippy::result_large_err)]
    pub(crate) fn result_at(&self, index: usize) -> Result<Projected> {
        let state = self.lock_state();
        match state.phase {
            Phase::Materialized => match state.slots.get(index) {
                Some(Slot::Ready(value)) => Ok(Arc::clone(value)),
                Some(Slot::Failed(BatchErrorKind::Projection, source)) => Err(Error::Batch(
                    BatchError::projection(index, Arc::clone(source)),
                )),
                Some(Slot::Failed(_, source)) => Err(Error::Batch(BatchError::store_execution(
                    index,
                    Arc::clone(source),
                ))),
                None => Err(invalid_state(format!("no query at batch index {index}"))),
            },
            Phase::Discarded => Err(discarded()),
            Phase::Open | Phase::Executing => {
                Err(invalid_state("batch has not been materialized"))
            }
        }
    }

    /// Drop the batch without executing it.
    ///
    /// Only an open batch can be discarded; returns whether it was. Handles
    /// attached to a discarded batch fail with `InvalidState`.
    pub fn discard(&self) -> bool {
        let mut state = self.lock_state();
        if state.phase != Phase::Open {
            return false;
        }
        if !state.descriptors.is_empty() {
            tracing::debug!(
                batch = self.id,
                pending = state.descriptors.len(),
                "Discarding unexecuted deferred queries"
            );
        }
        state.phase = Phase::Discarded;
        state.descriptors.clear();
        true
    }
}

impl<E: StoreExecutor> fmt::Debug for FutureQueryBatch<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("FutureQueryBatch")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("phase", &state.phase)
            .field("descriptors", &state.descriptors.len())
            .finish_non_exhaustive()
    }
}

/// Resets an executing batch to open unless the round trip completed.
struct ExecutingGuard<'a, E: StoreExecutor> {
    batch: &'a FutureQueryBatch<E>,
    armed: bool,
}

impl<E: StoreExecutor> ExecutingGuard<'_, E> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<E: StoreExecutor> Drop for ExecutingGuard<'_, E> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.batch.lock_state();
            if state.phase == Phase::Executing {
                state.phase = Phase::Open;
            }
        }
    }
}

fn invalid_state(message: impl Into<String>) -> Error {
    Error::Batch(BatchError::invalid_state(message))
}

fn discarded() -> Error {
    invalid_state("batch was discarded before it was materialized")
}
