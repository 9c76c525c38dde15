//! Cache primary keys, re-resolve rows on a hit.

use std::future::Future;
use std::time::Duration;

use repocache_domain::{Page, ReadResult, Record, Value};

use super::StrategyKind;
use crate::cache::{CacheKey, CacheTags, SharedStore, StoredValue};
use crate::error::{PersistenceError, Result};
use crate::query::{QuerySpec, ReadOperation};

/// Stores the identities of model-shaped results instead of the rows.
///
/// A hit re-runs the operation restricted to the cached keys, so the set of
/// matching rows is cached while their contents stay fresh. Non-model
/// results are stored verbatim.
#[derive(Clone)]
pub struct CacheById {
    store: SharedStore,
    ttl: Duration,
    tags: CacheTags,
}

impl CacheById {
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
        let key = CacheKey::for_query(StrategyKind::Id, &operation, spec)?;

        match self.store.get(&self.tags, &key).await? {
            None => {
                tracing::debug!(%key, operation = operation.name(), "Cache miss, falling back to data source");
                let result = fallback(spec.clone(), operation).await?;
                self.write_key(&key, spec.key_name(), &result).await?;
                Ok(result)
            }
            Some(StoredValue::Null) => {
                tracing::debug!(%key, "Cache hit (null)");
                Ok(ReadResult::Null)
            }
            Some(StoredValue::PrimaryKeySet(ids)) if ids.is_empty() => {
                tracing::debug!(%key, "Cache hit (empty)");
                Ok(ReadResult::Models(Vec::new()))
            }
            Some(StoredValue::PrimaryKeySet(ids)) => {
                tracing::debug!(%key, ids = ids.len(), operation = operation.name(), "Cache hit, replaying by key");
                let replay = spec.clone().restricted_to_keys(ids);
                fallback(replay, operation.narrowed()).await
            }
            Some(StoredValue::PageKeys { ids, page, per_page, total }) => {
                tracing::debug!(%key, ids = ids.len(), page, "Cache hit, replaying page by key");
                let items = if ids.is_empty() {
                    Vec::new()
                } else {
                    let replay = spec.clone().restricted_to_keys(ids);
                    fallback(replay, operation.narrowed()).await?.into_records()
                };
                Ok(ReadResult::Page(Page { items, page, per_page, total }))
            }
            Some(StoredValue::Raw(result)) => {
                tracing::debug!(%key, "Cache hit");
                Ok(result)
            }
        }
    }

    pub async fn write(&self, spec: &QuerySpec, operation: &ReadOperation, result: &ReadResult) -> Result<()> {
        let key = CacheKey::for_query(StrategyKind::Id, operation, spec)?;
        self.write_key(&key, spec.key_name(), result).await
    }

    async fn write_key(&self, key: &CacheKey, key_name: &str, result: &ReadResult) -> Result<()> {
        let stored = encode(result, key_name)?;
        self.store.put(&self.tags, key, &stored, self.ttl).await
    }

    pub async fn flush(&self) -> Result<()> {
        tracing::info!(tags = ?self.tags, "Flushing cached keys");
        self.store.flush(&self.tags).await
    }
}

/// Classify a result for storage.
fn encode(result: &ReadResult, key_name: &str) -> Result<StoredValue> {
    match result {
        ReadResult::Null => Ok(StoredValue::Null),
        ReadResult::Model(record) => record
            .key(key_name)
            .map(|id| StoredValue::PrimaryKeySet(vec![id.clone()]))
            .ok_or(PersistenceError::PrimaryKeyRequired),
        ReadResult::Models(records) => Ok(StoredValue::PrimaryKeySet(keys(records, key_name)?)),
        ReadResult::Page(page) => Ok(StoredValue::PageKeys {
            ids: keys(&page.items, key_name)?,
            page: page.page,
            per_page: page.per_page,
            total: page.total,
        }),
        ReadResult::Scalar(_) | ReadResult::Values(_) => Ok(StoredValue::Raw(result.clone())),
    }
}

/// Keys of `records` in order. Only the first record is checked for a key;
/// later records without one are skipped.
fn keys(records: &[Record], key_name: &str) -> Result<Vec<Value>> {
    if let Some(first) = records.first() {
        if first.key(key_name).is_none() {
            return Err(PersistenceError::PrimaryKeyRequired);
        }
    }

    Ok(records.iter().filter_map(|r| r.key(key_name).cloned()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{shared_store, MemoryStore, TaggedStore};
    use crate::query::{Operator, Predicate};
    use repocache_domain::ModelDefinition;
    use std::sync::{Arc, Mutex};
    use tokio_test::{assert_err, assert_ok};

    type Seen = Arc<Mutex<Vec<(QuerySpec, ReadOperation)>>>;

    fn setup() -> (CacheById, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let strategy = CacheById::new(store.clone(), Duration::from_secs(60), CacheTags::new("UserRepository"));
        (strategy, store)
    }

    fn spec() -> QuerySpec {
        QuerySpec::new(&ModelDefinition::new("User", "users"))
            .where_compare("users.active", Operator::Eq, true)
    }

    fn user(id: i64, name: &str) -> Record {
        Record::new().with("id", id).with("name", name)
    }

    /// Fallback that records what it was asked to run and returns `result`.
    fn recording(
        seen: &Seen,
        result: ReadResult,
    ) -> impl FnOnce(QuerySpec, ReadOperation) -> std::future::Ready<Result<ReadResult>> {
        let seen = Arc::clone(seen);
        move |spec, op| {
            seen.lock().unwrap().push((spec, op));
            std::future::ready(Ok(result))
        }
    }

    #[tokio::test]
    async fn test_scalar_round_trip() {
        let (strategy, _) = setup();
        let seen = Seen::default();

        let first = assert_ok!(strategy.get(&spec(), ReadOperation::Count, recording(&seen, ReadResult::Scalar(Value::Int(5)))).await);
        let second = assert_ok!(strategy.get(&spec(), ReadOperation::Count, recording(&seen, ReadResult::Null)).await);

        assert_eq!(first, ReadResult::Scalar(Value::Int(5)));
        assert_eq!(second, first);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_null_sentinel() {
        let (strategy, store) = setup();
        let seen = Seen::default();

        strategy.get(&spec(), ReadOperation::First, recording(&seen, ReadResult::Null)).await.unwrap();

        let key = CacheKey::for_query(StrategyKind::Id, &ReadOperation::First, &spec()).unwrap();
        assert_eq!(store.get(strategy.tags(), &key).await.unwrap(), Some(StoredValue::Null));

        let hit = strategy.get(&spec(), ReadOperation::First, recording(&seen, ReadResult::Model(user(1, "x")))).await.unwrap();
        assert_eq!(hit, ReadResult::Null);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_collection_sentinel() {
        let (strategy, store) = setup();
        let seen = Seen::default();

        strategy.get(&spec(), ReadOperation::Get, recording(&seen, ReadResult::Models(vec![]))).await.unwrap();

        let key = CacheKey::for_query(StrategyKind::Id, &ReadOperation::Get, &spec()).unwrap();
        assert_eq!(store.get(strategy.tags(), &key).await.unwrap(), Some(StoredValue::PrimaryKeySet(vec![])));

        let hit = strategy.get(&spec(), ReadOperation::Get, recording(&seen, ReadResult::Null)).await.unwrap();
        assert_eq!(hit, ReadResult::Models(vec![]));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replay_restricts_to_cached_keys() {
        let (strategy, _) = setup();
        let seen = Seen::default();
        let rows = ReadResult::Models(vec![user(7, "grace"), user(9, "ada")]);

        strategy.get(&spec(), ReadOperation::All, recording(&seen, rows)).await.unwrap();

        let fresh = ReadResult::Models(vec![user(7, "grace hopper"), user(9, "ada lovelace")]);
        let hit = strategy.get(&spec(), ReadOperation::All, recording(&seen, fresh.clone())).await.unwrap();
        assert_eq!(hit, fresh);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        let (replay, op) = &seen[1];
        assert_eq!(op, &ReadOperation::Get);
        assert_eq!(
            replay.wheres(),
            &[Predicate::In {
                column: "users.id".into(),
                values: vec![Value::Int(7), Value::Int(9)],
                negated: false,
            }]
        );
        assert_eq!(replay.bindings(), vec![Value::Int(7), Value::Int(9)]);
    }

    #[tokio::test]
    async fn test_replay_does_not_rewrite_cache() {
        let (strategy, store) = setup();
        let seen = Seen::default();

        strategy.get(&spec(), ReadOperation::Get, recording(&seen, ReadResult::Models(vec![user(7, "a")]))).await.unwrap();
        strategy.get(&spec(), ReadOperation::Get, recording(&seen, ReadResult::Models(vec![]))).await.unwrap();

        let key = CacheKey::for_query(StrategyKind::Id, &ReadOperation::Get, &spec()).unwrap();
        assert_eq!(
            store.get(strategy.tags(), &key).await.unwrap(),
            Some(StoredValue::PrimaryKeySet(vec![Value::Int(7)]))
        );
    }

    #[tokio::test]
    async fn test_pages_store_item_keys() {
        let (strategy, store) = setup();
        let page = Page { items: vec![user(3, "a"), user(4, "b")], page: 2, per_page: 2, total: Some(4) };
        let op = ReadOperation::Paginate { per_page: 2, page: 2 };

        strategy.write(&spec(), &op, &ReadResult::Page(page)).await.unwrap();

        let key = CacheKey::for_query(StrategyKind::Id, &op, &spec()).unwrap();
        assert_eq!(
            store.get(strategy.tags(), &key).await.unwrap(),
            Some(StoredValue::PageKeys {
                ids: vec![Value::Int(3), Value::Int(4)],
                page: 2,
                per_page: 2,
                total: Some(4),
            })
        );
    }

    #[tokio::test]
    async fn test_page_hit_keeps_requested_page_and_total() {
        let (strategy, _) = setup();
        let seen = Seen::default();
        let op = ReadOperation::Paginate { per_page: 2, page: 2 };
        let stored = Page { items: vec![user(3, "a"), user(4, "b")], page: 2, per_page: 2, total: Some(5) };

        strategy.get(&spec(), op.clone(), recording(&seen, ReadResult::Page(stored))).await.unwrap();

        // The replay sees only the cached keys, so its own page metadata is narrower.
        let replayed = Page { items: vec![user(3, "c"), user(4, "d")], page: 1, per_page: 2, total: Some(2) };
        let hit = strategy.get(&spec(), op, recording(&seen, ReadResult::Page(replayed))).await.unwrap();

        assert_eq!(
            hit,
            ReadResult::Page(Page { items: vec![user(3, "c"), user(4, "d")], page: 2, per_page: 2, total: Some(5) })
        );
        let seen = seen.lock().unwrap();
        assert_eq!(seen[1].1, ReadOperation::Paginate { per_page: 2, page: 1 });
    }

    #[tokio::test]
    async fn test_empty_page_hit_keeps_total() {
        let (strategy, _) = setup();
        let seen = Seen::default();
        let op = ReadOperation::Paginate { per_page: 2, page: 4 };
        let past_end = Page { items: vec![], page: 4, per_page: 2, total: Some(5) };

        strategy.get(&spec(), op.clone(), recording(&seen, ReadResult::Page(past_end.clone()))).await.unwrap();
        let hit = strategy.get(&spec(), op, recording(&seen, ReadResult::Null)).await.unwrap();

        assert_eq!(hit, ReadResult::Page(past_end));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_primary_key_required() {
        let (strategy, _) = setup();
        let keyless = Record::new().with("name", "ada");

        let err = assert_err!(strategy.write(&spec(), &ReadOperation::First, &ReadResult::Model(keyless.clone())).await);
        assert!(matches!(err, PersistenceError::PrimaryKeyRequired));

        let rows = ReadResult::Models(vec![keyless, user(2, "b")]);
        let err = assert_err!(strategy.write(&spec(), &ReadOperation::Get, &rows).await);
        assert!(matches!(err, PersistenceError::PrimaryKeyRequired));
    }

    #[test]
    fn test_later_keyless_records_are_skipped() {
        let records = vec![user(1, "a"), Record::new().with("name", "b"), user(3, "c")];
        assert_eq!(keys(&records, "id").unwrap(), vec![Value::Int(1), Value::Int(3)]);
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        struct Broken;

        #[async_trait::async_trait]
        impl TaggedStore for Broken {
            async fn get(&self, _: &CacheTags, _: &CacheKey) -> Result<Option<StoredValue>> {
                Err(PersistenceError::Redis("connection refused".into()))
            }
            async fn put(&self, _: &CacheTags, _: &CacheKey, _: &StoredValue, _: Duration) -> Result<()> {
                Ok(())
            }
            async fn flush(&self, _: &CacheTags) -> Result<()> {
                Ok(())
            }
        }

        let strategy = CacheById::new(shared_store(Broken), Duration::from_secs(1), CacheTags::new("UserRepository"));
        let seen = Seen::default();
        let err = assert_err!(strategy.get(&spec(), ReadOperation::Get, recording(&seen, ReadResult::Null)).await);

        assert!(matches!(err, PersistenceError::Redis(_)));
        assert!(seen.lock().unwrap().is_empty());
    }
}
