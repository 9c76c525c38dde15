//! # Cache Configuration
//!
//! Environment-based configuration for the cache layer.

use std::env;
use std::time::Duration;

use crate::error::{PersistenceError, Result};
use crate::strategy::StrategyKind;

/// Cache layer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Redis endpoint used by `RedisTagStore`
    pub redis_url: String,

    /// Namespace prepended to every Redis key
    pub key_prefix: String,

    /// TTL applied when a repository attaches a cache without one
    pub default_ttl: Duration,

    /// Strategy used when none is named
    pub default_strategy: StrategyKind,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "repocache".to_string(),
            default_ttl: Duration::from_secs(300),
            default_strategy: StrategyKind::Id,
        }
    }
}

impl CacheConfig {
    /// Load configuration from `REPOCACHE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup; unset
    /// variables fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let default_ttl = match lookup("REPOCACHE_TTL_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| PersistenceError::Config(format!("REPOCACHE_TTL_SECS={raw}: {e}")))?,
            None => defaults.default_ttl,
        };

        let default_strategy = match lookup("REPOCACHE_STRATEGY") {
            Some(raw) => raw.parse()?,
            None => defaults.default_strategy,
        };

        Ok(Self {
            redis_url: lookup("REPOCACHE_REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: lookup("REPOCACHE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            default_ttl,
            default_strategy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio_test::assert_err;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = CacheConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = CacheConfig::from_lookup(lookup(&[
            ("REPOCACHE_REDIS_URL", "redis://cache:6380"),
            ("REPOCACHE_KEY_PREFIX", "app"),
            ("REPOCACHE_TTL_SECS", "60"),
            ("REPOCACHE_STRATEGY", "result"),
        ]))
        .unwrap();

        assert_eq!(config.redis_url, "redis://cache:6380");
        assert_eq!(config.key_prefix, "app");
        assert_eq!(config.default_ttl, Duration::from_secs(60));
        assert_eq!(config.default_strategy, StrategyKind::Result);
    }

    #[test]
    fn test_malformed_values() {
        let err = assert_err!(CacheConfig::from_lookup(lookup(&[("REPOCACHE_TTL_SECS", "soon")])));
        assert!(matches!(err, PersistenceError::Config(_)));

        let err = assert_err!(CacheConfig::from_lookup(lookup(&[("REPOCACHE_STRATEGY", "lru")])));
        assert!(matches!(err, PersistenceError::CacheStrategyNotFound(name) if name == "lru"));
    }
}
