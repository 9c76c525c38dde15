//! Tag sets scoping cache entries for invalidation.

use serde::{Deserialize, Serialize};

/// Ordered set of tags. The first tag identifies the owning repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheTags(Vec<String>);

impl CacheTags {
    /// Tag set owned by `owner`.
    pub fn new(owner: impl Into<String>) -> Self {
        Self(vec![owner.into()])
    }

    /// Append a tag; duplicates are ignored.
    #[must_use]
    pub fn with(mut self, tag: impl Into<String>) -> Self {
        self.push(tag);
        self
    }

    pub fn push(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.0.contains(&tag) {
            self.0.push(tag);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    /// True when the two sets share at least one tag.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.iter().any(|t| other.contains(t))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for CacheTags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut tags = Self::default();
        for tag in iter {
            tags.push(tag);
        }
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_kept_and_duplicates_dropped() {
        let tags = CacheTags::new("UserRepository").with("users").with("UserRepository").with("admin");
        assert_eq!(tags.iter().collect::<Vec<_>>(), vec!["UserRepository", "users", "admin"]);
    }

    #[test]
    fn test_intersection() {
        let a: CacheTags = ["UserRepository", "users"].into_iter().collect();
        let b: CacheTags = ["PostRepository", "users"].into_iter().collect();
        let c = CacheTags::new("PostRepository");

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }
}
