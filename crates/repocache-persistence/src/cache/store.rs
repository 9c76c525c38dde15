//! Tagged cache store abstraction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{CacheKey, CacheTags, StoredValue};
use crate::error::Result;

/// Key/value store whose entries are grouped by tag sets.
///
/// An entry is addressed by the pair (tags, key): the same key written under
/// two different tag sets is two different entries.
#[async_trait]
pub trait TaggedStore: Send + Sync {
    /// Look up an entry. `None` is a miss; expired entries are misses.
    async fn get(&self, tags: &CacheTags, key: &CacheKey) -> Result<Option<StoredValue>>;

    /// Store an entry for `ttl`. A zero TTL removes the entry instead.
    async fn put(&self, tags: &CacheTags, key: &CacheKey, value: &StoredValue, ttl: Duration) -> Result<()>;

    /// Drop every entry written under any of `tags`.
    async fn flush(&self, tags: &CacheTags) -> Result<()>;
}

/// Store handle shared between repositories.
pub type SharedStore = Arc<dyn TaggedStore>;

/// Wrap a store for sharing.
pub fn shared_store<S: TaggedStore + 'static>(store: S) -> SharedStore {
    Arc::new(store)
}
