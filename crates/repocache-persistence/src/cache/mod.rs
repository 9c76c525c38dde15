//! # Cache Module
//!
//! Fingerprints, stored payloads and the tagged stores they are written to.

pub mod fingerprint;
pub mod memory_store;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod store;
pub mod stored_value;
pub mod tags;

pub use fingerprint::{compute_key, CacheKey};
pub use memory_store::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisTagStore;
pub use store::{shared_store, SharedStore, TaggedStore};
pub use stored_value::StoredValue;
pub use tags::CacheTags;
