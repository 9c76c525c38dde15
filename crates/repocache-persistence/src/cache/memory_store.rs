//! Process-local tagged store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{CacheKey, CacheTags, StoredValue, TaggedStore};
use crate::error::Result;

#[derive(Debug, Clone)]
struct Entry {
    value: StoredValue,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// In-memory [`TaggedStore`] with per-entry expiry.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<(CacheTags, CacheKey), Entry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Utc::now();
        self.entries.read().await.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop expired entries.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[async_trait]
impl TaggedStore for MemoryStore {
    async fn get(&self, tags: &CacheTags, key: &CacheKey) -> Result<Option<StoredValue>> {
        let now = Utc::now();
        let lookup = (tags.clone(), key.clone());

        {
            let entries = self.entries.read().await;
            match entries.get(&lookup) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: evict lazily.
        self.entries.write().await.remove(&lookup);
        Ok(None)
    }

    async fn put(&self, tags: &CacheTags, key: &CacheKey, value: &StoredValue, ttl: Duration) -> Result<()> {
        let lookup = (tags.clone(), key.clone());
        let mut entries = self.entries.write().await;

        if ttl.is_zero() {
            entries.remove(&lookup);
            return Ok(());
        }

        entries.insert(
            lookup,
            Entry {
                value: value.clone(),
                expires_at: expiry(Utc::now(), ttl),
            },
        );
        Ok(())
    }

    async fn flush(&self, tags: &CacheTags) -> Result<()> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|(entry_tags, _), _| !entry_tags.intersects(tags));

        tracing::debug!(removed = before - entries.len(), "Memory store flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::compute_key;
    use repocache_domain::{ReadResult, Value};
    use tokio_test::assert_ok;

    fn key(n: i64) -> CacheKey {
        compute_key("result", "get", &[], "select 1", &[Value::Int(n)]).unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryStore::new();
        let tags = CacheTags::new("UserRepository");
        let value = StoredValue::Raw(ReadResult::Scalar(Value::Int(3)));

        assert_ok!(store.put(&tags, &key(1), &value, Duration::from_secs(60)).await);
        assert_eq!(store.get(&tags, &key(1)).await.unwrap(), Some(value));
        assert_eq!(store.get(&tags, &key(2)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_are_scoped_by_tag_set() {
        let store = MemoryStore::new();
        let users = CacheTags::new("UserRepository");
        let admins = CacheTags::new("UserRepository").with("admin");

        store.put(&users, &key(1), &StoredValue::Null, Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get(&admins, &key(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let store = MemoryStore::new();
        let tags = CacheTags::new("UserRepository");

        store.put(&tags, &key(1), &StoredValue::Null, Duration::from_millis(20)).await.unwrap();
        assert!(store.get(&tags, &key(1)).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.get(&tags, &key(1)).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_zero_ttl_removes() {
        let store = MemoryStore::new();
        let tags = CacheTags::new("UserRepository");

        store.put(&tags, &key(1), &StoredValue::Null, Duration::from_secs(60)).await.unwrap();
        store.put(&tags, &key(1), &StoredValue::Null, Duration::ZERO).await.unwrap();
        assert!(store.get(&tags, &key(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_flush_only_touches_intersecting_tags() {
        let store = MemoryStore::new();
        let users = CacheTags::new("UserRepository").with("users");
        let posts = CacheTags::new("PostRepository");
        let ttl = Duration::from_secs(60);

        store.put(&users, &key(1), &StoredValue::Null, ttl).await.unwrap();
        store.put(&posts, &key(2), &StoredValue::Null, ttl).await.unwrap();

        store.flush(&CacheTags::new("users")).await.unwrap();

        assert!(store.get(&users, &key(1)).await.unwrap().is_none());
        assert!(store.get(&posts, &key(2)).await.unwrap().is_some());
        assert_eq!(store.len().await, 1);
    }
}
