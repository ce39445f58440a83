//! Configuration for an [`ExtContext`](crate::ExtContext).

use serde::{Deserialize, Serialize};
use sqlext_cache::CachePolicy;
use std::time::Duration;

/// Settings applied by an `ExtContext`.
///
/// Deserializes from partial documents; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtConfig {
    /// Maximum number of cached query results
    pub cache_capacity: usize,
    /// Default time-to-live for cached results in milliseconds (`None` = never expire)
    pub cache_ttl_ms: Option<u64>,
    /// Renew the time-to-live on every cache hit
    pub sliding_expiration: bool,
    /// Log the SQL of cached queries and bulk statements at `info` level
    pub log_sql: bool,
}

impl Default for ExtConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
            cache_ttl_ms: None,
            sliding_expiration: false,
            log_sql: false,
        }
    }
}

impl ExtConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache capacity (0 disables caching).
    #[must_use]
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set the default cache time-to-live.
    #[must_use]
    pub fn cache_ttl(mut self, ms: u64) -> Self {
        self.cache_ttl_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn sliding_expiration(mut self, enabled: bool) -> Self {
        self.sliding_expiration = enabled;
        self
    }

    #[must_use]
    pub fn log_sql(mut self, enabled: bool) -> Self {
        self.log_sql = enabled;
        self
    }

    /// Cache policy used when a caller does not supply one.
    pub fn default_cache_policy(&self) -> CachePolicy {
        match self.cache_ttl_ms {
            None => CachePolicy::never(),
            Some(ms) if self.sliding_expiration => CachePolicy::sliding(Duration::from_millis(ms)),
            Some(ms) => CachePolicy::absolute(Duration::from_millis(ms)),
        }
    }
}
