//! In-process cache of query results.

use crate::key::CacheKey;
use crate::policy::{CachePolicy, Expiration};
use asupersync::{Cx, Outcome};
use sqlext_core::{ConnectionLease, Error, ResultSet, Result, Statement, StoreExecutor};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped to make room for new ones.
    pub evictions: u64,
    /// Entries dropped because they expired or their tag was expired.
    pub expirations: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache (0.0 with no lookups).
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CachedResult {
    value: Arc<dyn Any + Send + Sync>,
    policy: CachePolicy,
    inserted: Instant,
    last_used: Instant,
}

impl CachedResult {
    fn is_expired(&self, now: Instant) -> bool {
        let deadline = match self.policy.expiration() {
            Expiration::Never => None,
            Expiration::Absolute(ttl) => self.inserted.checked_add(ttl),
            Expiration::Sliding(ttl) => self.last_used.checked_add(ttl),
        };
        deadline.is_some_and(|deadline| now >= deadline)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, CachedResult>,
    stats: CacheStats,
}

/// LRU cache of projected query results.
///
/// Values are stored type-erased and handed back as `Arc<T>`. Expired
/// entries are never served: they are dropped on lookup or by
/// [`purge_expired`](Self::purge_expired). When the cache is full, the
/// least-recently-used entry makes room for a new key. A capacity of zero
/// disables storage.
///
/// All methods take `&self`; the cache is internally locked and can be
/// shared behind an `Arc`.
pub struct QueryCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity.min(256)),
                stats: CacheStats::default(),
            }),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up `key` as of now.
    pub fn get<T: Send + Sync + 'static>(&self, key: CacheKey) -> Option<Arc<T>> {
        self.get_at(key, Instant::now())
    }

    /// Look up `key` as of `now`.
    ///
    /// A hit renews sliding expiration. An entry holding a different type
    /// counts as a miss and is left in place.
    pub fn get_at<T: Send + Sync + 'static>(&self, key: CacheKey, now: Instant) -> Option<Arc<T>> {
        let mut inner = self.lock();

        let expired = match inner.entries.get(&key) {
            None => {
                inner.stats.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            inner.entries.remove(&key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            tracing::trace!(key = %key, "Cache entry expired");
            return None;
        }

        let hit = inner.entries.get_mut(&key).and_then(|entry| {
            let value = Arc::clone(&entry.value).downcast::<T>().ok()?;
            entry.last_used = now;
            Some(value)
        });
        if hit.is_some() {
            inner.stats.hits += 1;
        } else {
            inner.stats.misses += 1;
        }
        hit
    }

    /// Store `value` under `key` as of now and return it shared.
    pub fn insert<T: Send + Sync + 'static>(
        &self,
        key: CacheKey,
        value: T,
        policy: CachePolicy,
    ) -> Arc<T> {
        self.insert_at(key, value, policy, Instant::now())
    }

    /// Store `value` under `key` as of `now`, replacing any previous entry.
    pub fn insert_at<T: Send + Sync + 'static>(
        &self,
        key: CacheKey,
        value: T,
        policy: CachePolicy,
        now: Instant,
    ) -> Arc<T> {
        let value = Arc::new(value);
        if self.capacity == 0 {
            return value;
        }

        let mut inner = self.lock();
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            Self::evict_lru(&mut inner);
        }
        inner.entries.insert(
            key,
            CachedResult {
                value: Arc::clone(&value) as Arc<dyn Any + Send + Sync>,
                policy,
                inserted: now,
                last_used: now,
            },
        );
        value
    }

    /// Whether `key` holds an entry, expired or not.
    pub fn contains(&self, key: CacheKey) -> bool {
        self.lock().entries.contains_key(&key)
    }

    /// Drop the entry for `key`. Returns whether one existed.
    pub fn remove(&self, key: CacheKey) -> bool {
        self.lock().entries.remove(&key).is_some()
    }

    /// Drop every entry carrying `tag`. Returns how many were dropped.
    pub fn expire_tag(&self, tag: &str) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.policy.has_tag(tag));
        let dropped = before - inner.entries.len();
        inner.stats.expirations += dropped as u64;
        if dropped > 0 {
            tracing::debug!(tag, dropped, "Expired cache tag");
        }
        dropped
    }

    /// Drop every entry expired as of now.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        let dropped = before - inner.entries.len();
        inner.stats.expirations += dropped as u64;
        dropped
    }

    /// Drop every entry. Statistics are kept.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    fn evict_lru(inner: &mut Inner) {
        let lru = inner
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(&key, _)| key);
        if let Some(key) = lru {
            inner.entries.remove(&key);
            inner.stats.evictions += 1;
            tracing::trace!(key = %key, "Evicted least-recently-used cache entry");
        }
    }

    /// Serve `statement` projected into `T` from the cache, or execute it.
    ///
    /// On a miss the statement runs in its own round trip; a closed
    /// connection is opened for it and closed afterwards. Only successful
    /// projections are cached.
    #[tracing::instrument(level = "debug", skip_all, fields(sql = %statement.sql()))]
    pub async fn get_or_execute<E, T, F>(
        &self,
        cx: &Cx,
        executor: &E,
        statement: &Statement,
        policy: CachePolicy,
        project: F,
    ) -> Outcome<Arc<T>, Error>
    where
        E: StoreExecutor + ?Sized,
        T: Send + Sync + 'static,
        F: FnOnce(&ResultSet) -> Result<T>,
    {
        let key = CacheKey::for_statement::<T>(statement);
        if let Some(hit) = self.get::<T>(key) {
            tracing::trace!(key = %key, "Cache hit");
            return Outcome::Ok(hit);
        }

        let lease = match ConnectionLease::acquire(cx, executor).await {
            Outcome::Ok(lease) => lease,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let outcome = executor.query_result_set(cx, statement).await;
        if let Err(e) = lease.release() {
            tracing::warn!(error = %e, "Failed to close connection after cached query");
        }

        let set = match outcome {
            Outcome::Ok(set) => set,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        match project(&set) {
            Ok(value) => {
                tracing::debug!(key = %key, rows = set.len(), "Cached query result");
                Outcome::Ok(self.insert(key, value, policy))
            }
            Err(e) => Outcome::Err(e),
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("QueryCache")
            .field("capacity", &self.capacity)
            .field("len", &inner.entries.len())
            .field("stats", &inner.stats)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::manual_async_fn)] // Mock trait impls must match trait signatures
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use sqlext_core::{ConnectionState, Dialect, QueryError, QueryErrorKind, Value};
    use std::future::Future;
    use std::time::Duration;

    fn key(n: u64) -> CacheKey {
        CacheKey::from_raw(n)
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = QueryCache::new(10);
        assert!(cache.get::<i64>(key(1)).is_none());

        let stored = cache.insert(key(1), 42_i64, CachePolicy::never());
        let hit = cache.get::<i64>(key(1)).expect("cached");
        assert!(Arc::ptr_eq(&stored, &hit));

        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                evictions: 0,
                expirations: 0
            }
        );
        assert!((cache.stats().hit_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_type_mismatch_is_miss() {
        let cache = QueryCache::new(10);
        cache.insert(key(1), 42_i64, CachePolicy::never());
        assert!(cache.get::<String>(key(1)).is_none());
        assert!(cache.contains(key(1)));
    }

    #[test]
    fn test_absolute_expiration() {
        let cache = QueryCache::new(10);
        let t0 = Instant::now();
        cache.insert_at(key(1), 1_i64, CachePolicy::absolute(Duration::from_secs(10)), t0);

        assert!(cache.get_at::<i64>(key(1), t0 + Duration::from_secs(5)).is_some());
        assert!(cache.get_at::<i64>(key(1), t0 + Duration::from_secs(10)).is_none());
        assert!(!cache.contains(key(1)));
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_sliding_expiration_renews_on_hit() {
        let cache = QueryCache::new(10);
        let t0 = Instant::now();
        cache.insert_at(key(1), 1_i64, CachePolicy::sliding(Duration::from_secs(10)), t0);

        assert!(cache.get_at::<i64>(key(1), t0 + Duration::from_secs(8)).is_some());
        assert!(cache.get_at::<i64>(key(1), t0 + Duration::from_secs(16)).is_some());
        assert!(cache.get_at::<i64>(key(1), t0 + Duration::from_secs(27)).is_none());
    }

    #[test]
    fn test_expire_tag() {
        let cache = QueryCache::new(10);
        cache.insert(key(1), 1_i64, CachePolicy::never().tag("users"));
        cache.insert(key(2), 2_i64, CachePolicy::never().tags(["users", "orders"]));
        cache.insert(key(3), 3_i64, CachePolicy::never().tag("orders"));

        assert_eq!(cache.expire_tag("users"), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(key(3)));
        assert_eq!(cache.expire_tag("users"), 0);
    }

    #[test]
    fn test_purge_expired() {
        let cache = QueryCache::new(10);
        let t0 = Instant::now();
        cache.insert_at(key(1), 1_i64, CachePolicy::absolute(Duration::from_secs(1)), t0);
        cache.insert_at(key(2), 2_i64, CachePolicy::never(), t0);

        assert_eq!(cache.purge_expired_at(t0 + Duration::from_secs(2)), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = QueryCache::new(2);
        let t0 = Instant::now();
        cache.insert_at(key(1), 1_i64, CachePolicy::never(), t0);
        cache.insert_at(key(2), 2_i64, CachePolicy::never(), t0 + Duration::from_secs(1));

        // Touch key 1 so key 2 becomes least recently used
        assert!(cache.get_at::<i64>(key(1), t0 + Duration::from_secs(2)).is_some());
        cache.insert_at(key(3), 3_i64, CachePolicy::never(), t0 + Duration::from_secs(3));

        assert!(cache.contains(key(1)));
        assert!(!cache.contains(key(2)));
        assert!(cache.contains(key(3)));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = QueryCache::new(0);
        let value = cache.insert(key(1), 1_i64, CachePolicy::never());
        assert_eq!(*value, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = QueryCache::default();
        cache.insert(key(1), 1_i64, CachePolicy::never());
        cache.insert(key(2), 2_i64, CachePolicy::never());
        assert!(cache.remove(key(1)));
        assert!(!cache.remove(key(1)));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[derive(Debug, Default)]
    struct MockState {
        open: bool,
        opens: usize,
        closes: usize,
        queries: usize,
        fail: bool,
    }

    #[derive(Debug, Default)]
    struct MockExecutor {
        state: Mutex<MockState>,
    }

    impl StoreExecutor for MockExecutor {
        fn dialect(&self) -> Dialect {
            Dialect::Sqlite
        }

        fn state(&self) -> ConnectionState {
            if self.state.lock().expect("lock poisoned").open {
                ConnectionState::Open
            } else {
                ConnectionState::Closed
            }
        }

        fn open(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
            let mut guard = self.state.lock().expect("lock poisoned");
            guard.open = true;
            guard.opens += 1;
            async { Outcome::Ok(()) }
        }

        fn close(&self) -> Result<()> {
            let mut guard = self.state.lock().expect("lock poisoned");
            guard.open = false;
            guard.closes += 1;
            Ok(())
        }

        fn execute_multi_result(
            &self,
            _cx: &Cx,
            statement: &Statement,
            _expected_sets: usize,
        ) -> impl Future<Output = Outcome<Vec<ResultSet>, Error>> + Send {
            let mut guard = self.state.lock().expect("lock poisoned");
            guard.queries += 1;
            let outcome = if guard.fail {
                Outcome::Err(Error::Query(QueryError {
                    kind: QueryErrorKind::Database,
                    sql: Some(statement.sql().to_string()),
                    sqlstate: None,
                    message: "boom".to_string(),
                    source: None,
                }))
            } else {
                Outcome::Ok(vec![ResultSet::from_values(
                    vec!["count".to_string()],
                    vec![vec![Value::BigInt(7)]],
                )])
            };
            async move { outcome }
        }
    }

    fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
        match outcome {
            Outcome::Ok(v) => v,
            Outcome::Err(e) => panic!("unexpected error: {e}"),
            Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
            Outcome::Panicked(p) => panic!("panicked: {p:?}"),
        }
    }

    #[test]
    fn test_get_or_execute_runs_once() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let exec = MockExecutor::default();
        let cache = QueryCache::new(8);
        let stmt = Statement::new("SELECT COUNT(*) FROM users");

        rt.block_on(async {
            let first = unwrap_outcome(
                cache
                    .get_or_execute(
                        &cx,
                        &exec,
                        &stmt,
                        CachePolicy::never(),
                        ResultSet::scalar::<i64>,
                    )
                    .await,
            );
            let second = unwrap_outcome(
                cache
                    .get_or_execute(
                        &cx,
                        &exec,
                        &stmt,
                        CachePolicy::never(),
                        ResultSet::scalar::<i64>,
                    )
                    .await,
            );
            assert_eq!(*first, 7);
            assert!(Arc::ptr_eq(&first, &second));
        });

        let guard = exec.state.lock().expect("lock poisoned");
        assert_eq!(guard.queries, 1);
        assert_eq!((guard.opens, guard.closes), (1, 1));
    }

    #[test]
    fn test_get_or_execute_does_not_cache_errors() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let exec = MockExecutor::default();
        exec.state.lock().expect("lock poisoned").fail = true;
        let cache = QueryCache::new(8);
        let stmt = Statement::new("SELECT COUNT(*) FROM users");

        rt.block_on(async {
            let outcome = cache
                .get_or_execute(
                    &cx,
                    &exec,
                    &stmt,
                    CachePolicy::never(),
                    ResultSet::scalar::<i64>,
                )
                .await;
            assert!(matches!(outcome, Outcome::Err(_)));

            // Projection failure is not cached either
            exec.state.lock().expect("lock poisoned").fail = false;
            let outcome = cache
                .get_or_execute(
                    &cx,
                    &exec,
                    &stmt,
                    CachePolicy::never(),
                    ResultSet::scalar::<String>,
                )
                .await;
            assert!(matches!(outcome, Outcome::Err(_)));
        });

        assert!(cache.is_empty());
        let guard = exec.state.lock().expect("lock poisoned");
        assert_eq!(guard.queries, 2);
        assert_eq!(guard.opens, guard.closes);
    }
}
