//! Expiration and tagging rules for cached results.

use std::time::Duration;

/// When a cached entry stops being served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Expiration {
    /// Kept until evicted, removed or tag-expired.
    #[default]
    Never,
    /// Expires a fixed time after insertion.
    Absolute(Duration),
    /// Expires after going unread for the given time; every hit renews it.
    Sliding(Duration),
}

/// Expiration plus invalidation tags for one cached result.
///
/// # Example
///
/// ```
/// use sqlext_cache::{CachePolicy, Expiration};
/// use std::time::Duration;
///
/// let policy = CachePolicy::sliding(Duration::from_secs(30))
///     .tag("users")
///     .tag("dashboard");
/// assert_eq!(policy.expiration(), Expiration::Sliding(Duration::from_secs(30)));
/// assert!(policy.has_tag("users"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachePolicy {
    expiration: Expiration,
    tags: Vec<String>,
}

impl CachePolicy {
    pub fn never() -> Self {
        Self::default()
    }

    pub fn absolute(ttl: Duration) -> Self {
        Self {
            expiration: Expiration::Absolute(ttl),
            tags: Vec::new(),
        }
    }

    pub fn sliding(ttl: Duration) -> Self {
        Self {
            expiration: Expiration::Sliding(ttl),
            tags: Vec::new(),
        }
    }

    /// Attach an invalidation tag. Duplicates are ignored.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    #[must_use]
    pub fn tags<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        tags.into_iter().fold(self, |policy, tag| policy.tag(tag))
    }

    pub fn expiration(&self) -> Expiration {
        self.expiration
    }

    pub fn tag_list(&self) -> &[String] {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_never_expires() {
        let policy = CachePolicy::default();
        assert_eq!(policy.expiration(), Expiration::Never);
        assert!(policy.tag_list().is_empty());
        assert_eq!(policy, CachePolicy::never());
    }

    #[test]
    fn test_tags_deduplicate() {
        let policy = CachePolicy::absolute(Duration::from_secs(5))
            .tags(["a", "b"])
            .tag("a");
        assert_eq!(policy.tag_list(), &["a".to_string(), "b".to_string()]);
        assert!(!policy.has_tag("c"));
    }
}
