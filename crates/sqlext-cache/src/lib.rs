//! Query result caching for sqlext.
//!
//! Results are cached by statement fingerprint and result type, with
//! absolute or sliding expiration, tag-based invalidation and LRU eviction.

pub mod key;
pub mod policy;
pub mod store;

pub use key::CacheKey;
pub use policy::{CachePolicy, Expiration};
pub use store::{CacheStats, QueryCache};
