//! # Repocache Persistence Library
//!
//! Repository facade with tag-scoped caching of query results.
//!
//! ## Architecture
//!
//! Reads issued through a [`Repository`] are fingerprinted (operation,
//! arguments, compiled SQL and bindings) and served through an attached
//! caching strategy:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Application Layer                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Repository Facade                         │
//! │       (QuerySpec builder, reset after every read)            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Cache Strategy                           │
//! │       ById (keys + replay)  /  ByResult (full result)        │
//! └─────────────────────────────────────────────────────────────┘
//!                    │                   │
//!                    ▼                   ▼
//! ┌─────────────────────────┐   ┌──────────────────────────────┐
//! │      Tagged Store       │   │         Data Source          │
//! │   (Memory or Redis)     │   │     (Source of Truth)        │
//! └─────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - `redis`: Enable the Redis tagged store (default)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use repocache_persistence::{MemorySource, MemoryStore, Repository};
//!
//! let mut users = Repository::new("UserRepository", model, source, store);
//!
//! let adults = users
//!     .with_cache(Duration::from_secs(60), ["adults"], "id")?
//!     .filter("age", ">=", 18)?
//!     .get()
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod config;
pub mod error;
pub mod query;
pub mod repository;
pub mod strategy;

// Re-export commonly used types
pub use cache::{compute_key, shared_store, CacheKey, CacheTags, MemoryStore, SharedStore, StoredValue, TaggedStore};
#[cfg(feature = "redis")]
pub use cache::RedisTagStore;
pub use config::CacheConfig;
pub use error::{PersistenceError, Result};
pub use query::{BuilderOperation, Direction, KeyFilter, Operation, Operator, QuerySpec, ReadOperation};
pub use repository::{CallOutcome, DataSource, MemorySource, Repository, SharedDataSource};
pub use strategy::{CacheById, CacheByResult, CacheStrategy, StrategyKind};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Connect the Redis store described by the environment.
///
/// # Errors
///
/// Returns an error if the configuration is malformed or Redis is unreachable.
#[cfg(feature = "redis")]
pub async fn init_default() -> Result<(CacheConfig, SharedStore)> {
    let config = CacheConfig::from_env()?;
    let store = RedisTagStore::new(&config).await?;
    Ok((config, shared_store(store)))
}
