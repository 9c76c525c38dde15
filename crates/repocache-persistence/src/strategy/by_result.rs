//! Cache the full result.

use std::future::Future;
use std::time::Duration;

use repocache_domain::ReadResult;

use super::StrategyKind;
use crate::cache::{CacheKey, CacheTags, SharedStore, StoredValue};
use crate::error::Result;
use crate::query::{QuerySpec, ReadOperation};

/// Stores every result verbatim. Hits never touch the data source, so they
/// can be stale until the tags are flushed or the TTL runs out.
#[derive(Clone)]
pub struct CacheByResult {
    store: SharedStore,
    ttl: Duration,
    tags: CacheTags,
}

impl CacheByResult {
    #[must_use]
    pub fn new(store: SharedStore, ttl: Duration, tags: CacheTags) -> Self {
        Self { store, ttl, tags }
    }

    #[must_use]
    pub const fn tags(&self) -> &CacheTags {
        &self.tags
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get<F, Fut>(&self, spec: &QuerySpec, operation: ReadOperation, fallback: F) -> Result<ReadResult>
    where
        F: FnOnce(QuerySpec, ReadOperation) -> Fut,
        Fut: Future<Output = Result<ReadResult>>,
    {
        let key = CacheKey::for_query(StrategyKind::Result, &operation, spec)?;

        match self.store.get(&self.tags, &key).await? {
            Some(StoredValue::Raw(result)) => {
                tracing::debug!(%key, operation = operation.name(), "Cache hit");
                return Ok(result);
            }
            Some(other) => {
                tracing::warn!(%key, kind = other.kind(), "Unexpected cached value, treating as miss");
            }
            None => {
                tracing::debug!(%key, operation = operation.name(), "Cache miss, falling back to data source");
            }
        }

        let result = fallback(spec.clone(), operation).await?;
        self.write_key(&key, &result).await?;
        Ok(result)
    }

    pub async fn write(&self, spec: &QuerySpec, operation: &ReadOperation, result: &ReadResult) -> Result<()> {
        let key = CacheKey::for_query(StrategyKind::Result, operation, spec)?;
        self.write_key(&key, result).await
    }

    async fn write_key(&self, key: &CacheKey, result: &ReadResult) -> Result<()> {
        let stored = StoredValue::Raw(result.clone());
        self.store.put(&self.tags, key, &stored, self.ttl).await
    }

    pub async fn flush(&self) -> Result<()> {
        tracing::info!(tags = ?self.tags, "Flushing cached results");
        self.store.flush(&self.tags).await
    }
}
