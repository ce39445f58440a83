//! Cache keys.

use sqlext_core::Statement;
use std::any::TypeId;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

/// Identity of a cached result.
///
/// Keys built from a statement mix in the result type, so the same SQL
/// projected into two different types occupies two entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(u64);

impl CacheKey {
    /// Key for `statement` projected into `T`.
    pub fn for_statement<T: 'static>(statement: &Statement) -> Self {
        let mut hasher = DefaultHasher::new();
        statement.fingerprint().hash(&mut hasher);
        TypeId::of::<T>().hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Key computed from any hashable value.
    pub fn of(value: &impl Hash) -> Self {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        Self(hasher.finish())
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_depends_on_statement_and_type() {
        let stmt = Statement::new("SELECT COUNT(*) FROM users WHERE age > $1").bind(30_i64);
        let same = Statement::new("SELECT COUNT(*) FROM users WHERE age > $1").bind(30_i64);
        let other = Statement::new("SELECT COUNT(*) FROM users WHERE age > $1").bind(40_i64);

        assert_eq!(
            CacheKey::for_statement::<i64>(&stmt),
            CacheKey::for_statement::<i64>(&same)
        );
        assert_ne!(
            CacheKey::for_statement::<i64>(&stmt),
            CacheKey::for_statement::<i64>(&other)
        );
        assert_ne!(
            CacheKey::for_statement::<i64>(&stmt),
            CacheKey::for_statement::<String>(&stmt)
        );
    }

    #[test]
    fn test_key_of_and_display() {
        assert_eq!(CacheKey::of(&"users"), CacheKey::of(&"users"));
        assert_ne!(CacheKey::of(&"users"), CacheKey::of(&"orders"));
        assert_eq!(CacheKey::from_raw(255).to_string(), "00000000000000ff");
        assert_eq!(CacheKey::from_raw(9).get(), 9);
    }
}
