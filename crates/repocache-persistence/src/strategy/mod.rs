//! # Strategy Module
//!
//! Enum-dispatched caching strategies.
//!
//! ## Available Strategies
//!
//! - `ById` - Store only primary keys of model-shaped results and re-resolve
//!   them through the data source on a hit, so hits always see fresh rows
//!   (default)
//! - `ByResult` - Store the full result and serve it verbatim on a hit
//!
//! ## Example
//!
//! ```rust,ignore
//! use repocache_persistence::strategy::{CacheStrategy, StrategyKind};
//!
//! let strategy = CacheStrategy::new("id".parse()?, store, ttl, tags);
//!
//! let result = strategy
//!     .get(&spec, ReadOperation::Get, |spec, op| async move {
//!         source.execute(&spec, &op).await
//!     })
//!     .await?;
//! ```

pub mod by_id;
pub mod by_result;

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use repocache_domain::ReadResult;

pub use by_id::CacheById;
pub use by_result::CacheByResult;

use crate::cache::{CacheTags, SharedStore};
use crate::error::{PersistenceError, Result};
use crate::query::{QuerySpec, ReadOperation};

/// Strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StrategyKind {
    #[default]
    Id,
    Result,
}

impl StrategyKind {
    /// Fingerprint prefix; also the name accepted by `from_str`.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Result => "result",
        }
    }
}

impl FromStr for StrategyKind {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "id" => Ok(Self::Id),
            "result" => Ok(Self::Result),
            other => Err(PersistenceError::CacheStrategyNotFound(other.to_string())),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Caching strategy attached to a repository.
#[derive(Clone)]
pub enum CacheStrategy {
    ById(CacheById),
    ByResult(CacheByResult),
}

impl CacheStrategy {
    #[must_use]
    pub fn new(kind: StrategyKind, store: SharedStore, ttl: Duration, tags: CacheTags) -> Self {
        match kind {
            StrategyKind::Id => Self::ById(CacheById::new(store, ttl, tags)),
            StrategyKind::Result => Self::ByResult(CacheByResult::new(store, ttl, tags)),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> StrategyKind {
        match self {
            Self::ById(_) => StrategyKind::Id,
            Self::ByResult(_) => StrategyKind::Result,
        }
    }

    #[must_use]
    pub const fn tags(&self) -> &CacheTags {
        match self {
            Self::ById(s) => s.tags(),
            Self::ByResult(s) => s.tags(),
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        match self {
            Self::ById(s) => s.ttl(),
            Self::ByResult(s) => s.ttl(),
        }
    }

    /// Serve `operation` from the cache, or through `fallback` on a miss.
    ///
    /// `fallback` receives the specification and operation to execute; on
    /// an id replay these are the narrowed ones.
    pub async fn get<F, Fut>(&self, spec: &QuerySpec, operation: ReadOperation, fallback: F) -> Result<ReadResult>
    where
        F: FnOnce(QuerySpec, ReadOperation) -> Fut,
        Fut: Future<Output = Result<ReadResult>>,
    {
        match self {
            Self::ById(s) => s.get(spec, operation, fallback).await,
            Self::ByResult(s) => s.get(spec, operation, fallback).await,
        }
    }

    /// Store `result` as the cached answer to `operation` on `spec`.
    pub async fn write(&self, spec: &QuerySpec, operation: &ReadOperation, result: &ReadResult) -> Result<()> {
        match self {
            Self::ById(s) => s.write(spec, operation, result).await,
            Self::ByResult(s) => s.write(spec, operation, result).await,
        }
    }

    /// Drop every entry under this strategy's tags.
    pub async fn flush(&self) -> Result<()> {
        match self {
            Self::ById(s) => s.flush().await,
            Self::ByResult(s) => s.flush().await,
        }
    }
}

impl fmt::Debug for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStrategy")
            .field("kind", &self.kind())
            .field("tags", self.tags())
            .field("ttl", &self.ttl())
            .finish()
    }
}
