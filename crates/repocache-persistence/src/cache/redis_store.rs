//! # Redis Tagged Store
//!
//! Tag namespaces on top of plain Redis keys.
//!
//! Each tag owns a namespace id stored at `{prefix}:tag:{tag}:key`. An entry
//! lives at `{prefix}:{sha256(namespace ids)}:{key}`, so rotating any tag's
//! namespace makes every entry written under it unreachable. Entry keys are
//! also recorded per tag in `{prefix}:tag:{tag}:entries` so a flush can
//! delete them instead of waiting for their TTL.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{CacheKey, CacheTags, StoredValue, TaggedStore};
use crate::config::CacheConfig;
use crate::error::Result;

/// Redis-backed [`TaggedStore`].
#[derive(Clone)]
pub struct RedisTagStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisTagStore {
    /// Connect using the configured URL and key prefix.
    pub async fn new(config: &CacheConfig) -> Result<Self> {
        let client = Client::open(config.redis_url.as_str())?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            prefix: config.key_prefix.clone(),
        })
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Namespace id of every tag, creating missing ones.
    async fn namespace_ids(&self, tags: &CacheTags) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut ids = Vec::with_capacity(tags.len());

        for tag in tags.iter() {
            let ns_key = namespace_key(&self.prefix, tag);
            let existing: Option<String> = conn.get(&ns_key).await?;

            let id = match existing {
                Some(id) => id,
                None => {
                    let candidate = Uuid::new_v4().to_string();
                    let created: bool = conn.set_nx(&ns_key, &candidate).await?;
                    if created {
                        candidate
                    } else {
                        // Lost the race; use whatever the winner wrote.
                        let winner: Option<String> = conn.get(&ns_key).await?;
                        winner.unwrap_or(candidate)
                    }
                }
            };
            ids.push(id);
        }

        Ok(ids)
    }

    async fn resolve(&self, tags: &CacheTags, key: &CacheKey) -> Result<String> {
        let ids = self.namespace_ids(tags).await?;
        Ok(entry_key(&self.prefix, &ids, key))
    }
}

// =============================================================================
// KEY LAYOUT
// =============================================================================

pub(crate) fn namespace_key(prefix: &str, tag: &str) -> String {
    format!("{prefix}:tag:{tag}:key")
}

pub(crate) fn entries_key(prefix: &str, tag: &str) -> String {
    format!("{prefix}:tag:{tag}:entries")
}

pub(crate) fn entry_key(prefix: &str, namespace_ids: &[String], key: &CacheKey) -> String {
    let namespace = hex::encode(Sha256::digest(namespace_ids.join("|").as_bytes()));
    format!("{prefix}:{namespace}:{key}")
}

#[async_trait]
impl TaggedStore for RedisTagStore {
    async fn get(&self, tags: &CacheTags, key: &CacheKey) -> Result<Option<StoredValue>> {
        let entry = self.resolve(tags, key).await?;
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(&entry).await?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, tags: &CacheTags, key: &CacheKey, value: &StoredValue, ttl: Duration) -> Result<()> {
        let entry = self.resolve(tags, key).await?;
        let mut conn = self.conn.clone();

        if ttl.is_zero() {
            let _: i64 = conn.del(&entry).await?;
            return Ok(());
        }

        let json = serde_json::to_string(value)?;
        let _: () = conn.set_ex(&entry, json, ttl.as_secs().max(1)).await?;

        for tag in tags.iter() {
            let _: i64 = conn.sadd(entries_key(&self.prefix, tag), &entry).await?;
        }
        Ok(())
    }

    async fn flush(&self, tags: &CacheTags) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut doomed = Vec::new();

        for tag in tags.iter() {
            let set = entries_key(&self.prefix, tag);
            let members: Vec<String> = conn.smembers(&set).await?;
            doomed.extend(members);
            doomed.push(set);
            doomed.push(namespace_key(&self.prefix, tag));
        }

        let deleted: i64 = if doomed.is_empty() { 0 } else { conn.del(&doomed).await? };
        tracing::debug!(deleted, "Redis tags flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::compute_key;

    fn key() -> CacheKey {
        compute_key("id", "get", &[], r#"select * from "users""#, &[]).unwrap()
    }

    #[test]
    fn test_tag_keys() {
        assert_eq!(namespace_key("repocache", "users"), "repocache:tag:users:key");
        assert_eq!(entries_key("repocache", "users"), "repocache:tag:users:entries");
    }

    #[test]
    fn test_entry_key_depends_on_namespaces() {
        let a = entry_key("repocache", &["n1".to_string(), "n2".to_string()], &key());
        let b = entry_key("repocache", &["n1".to_string(), "n2".to_string()], &key());
        let rotated = entry_key("repocache", &["n1".to_string(), "n3".to_string()], &key());

        assert_eq!(a, b);
        assert_ne!(a, rotated);
        assert!(a.starts_with("repocache:"));
        assert!(a.ends_with(key().as_str()));
    }
}
