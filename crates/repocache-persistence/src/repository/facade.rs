//! # Repository Facade
//!
//! Fluent query building over one model, with optional caching of reads.
//!
//! Builder calls accumulate into the pending [`QuerySpec`]. A read consumes
//! it: the repository falls back to a fresh specification and drops the
//! attached cache strategy, so every read starts from a clean slate.

use std::future::Future;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use repocache_domain::{ModelDefinition, Page, ReadResult, Record, Value};

use super::traits::SharedDataSource;
use crate::cache::{CacheTags, SharedStore};
use crate::config::CacheConfig;
use crate::error::{PersistenceError, Result};
use crate::query::{Direction, KeyFilter, Operation, Operator, QuerySpec, ReadOperation};
use crate::strategy::{CacheStrategy, StrategyKind};

/// Result of [`Repository::call`].
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// A builder operation refined the pending query.
    Applied,
    /// A read operation ran.
    Read(ReadResult),
}

/// Repository over a single model.
pub struct Repository {
    name: String,
    model: ModelDefinition,
    source: SharedDataSource,
    store: SharedStore,
    query: QuerySpec,
    cache: Option<CacheStrategy>,
}

impl Repository {
    /// `name` identifies the repository in cache tags and error messages.
    pub fn new(name: impl Into<String>, model: ModelDefinition, source: SharedDataSource, store: SharedStore) -> Self {
        let query = QuerySpec::new(&model);
        Self {
            name: name.into(),
            model,
            source,
            store,
            query,
            cache: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn model(&self) -> &ModelDefinition {
        &self.model
    }

    /// Pending query.
    #[must_use]
    pub const fn query(&self) -> &QuerySpec {
        &self.query
    }

    /// Strategy attached for the next read, if any.
    #[must_use]
    pub const fn cache(&self) -> Option<&CacheStrategy> {
        self.cache.as_ref()
    }

    // =========================================================================
    // CACHE
    // =========================================================================

    /// Cache the next read for `ttl` under `[name] + tags` using the named
    /// strategy (`id` or `result`).
    pub fn with_cache<I, S>(&mut self, ttl: Duration, tags: I, strategy: &str) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kind: StrategyKind = strategy.parse()?;
        let mut cache_tags = CacheTags::new(self.name.clone());
        for tag in tags {
            cache_tags.push(tag);
        }

        self.cache = Some(CacheStrategy::new(kind, Arc::clone(&self.store), ttl, cache_tags));
        Ok(self)
    }

    /// [`Self::with_cache`] with the configured default TTL and strategy.
    pub fn with_default_cache(&mut self, config: &CacheConfig) -> &mut Self {
        self.cache = Some(CacheStrategy::new(
            config.default_strategy,
            Arc::clone(&self.store),
            config.default_ttl,
            CacheTags::new(self.name.clone()),
        ));
        self
    }

    pub fn without_cache(&mut self) -> &mut Self {
        self.cache = None;
        self
    }

    /// Flush the attached strategy's tags, or every entry this repository
    /// wrote when none is attached.
    pub async fn flush_cache(&self) -> Result<()> {
        match &self.cache {
            Some(cache) => cache.flush().await,
            None => {
                tracing::info!(repository = %self.name, "Flushing repository cache");
                self.store.flush(&CacheTags::new(self.name.clone())).await
            }
        }
    }

    // =========================================================================
    // BUILDERS
    // =========================================================================

    fn update(&mut self, f: impl FnOnce(QuerySpec) -> QuerySpec) -> &mut Self {
        let spec = mem::replace(&mut self.query, QuerySpec::new(&self.model));
        self.query = f(spec);
        self
    }

    fn try_update(&mut self, f: impl FnOnce(QuerySpec) -> Result<QuerySpec>) -> Result<&mut Self> {
        self.query = f(self.query.clone())?;
        Ok(self)
    }

    pub fn select<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update(|q| q.select(columns))
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.update(QuerySpec::distinct)
    }

    pub fn limit(&mut self, n: u64) -> &mut Self {
        self.update(|q| q.limit(n))
    }

    pub fn take(&mut self, n: u64) -> &mut Self {
        self.limit(n)
    }

    pub fn skip(&mut self, n: u64) -> &mut Self {
        self.update(|q| q.offset(n))
    }

    pub fn for_page(&mut self, page: u64, per_page: u64) -> &mut Self {
        self.update(|q| q.for_page(page, per_page))
    }

    pub fn group_by<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update(|q| q.group_by(columns))
    }

    pub fn order_by(&mut self, column: impl Into<String>, direction: Direction) -> &mut Self {
        self.update(|q| q.order_by(column, direction))
    }

    pub fn order_by_key(&mut self, direction: Direction) -> &mut Self {
        self.update(|q| {
            let key = q.qualified_key();
            q.order_by(key, direction)
        })
    }

    pub fn where_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.update(|q| q.where_null(column, false))
    }

    pub fn where_not_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.update(|q| q.where_null(column, true))
    }

    /// Filter `column` by a value or a set of values; see [`QuerySpec::filter`].
    pub fn filter(&mut self, column: impl Into<String>, operator: &str, value: impl Into<KeyFilter>) -> Result<&mut Self> {
        self.try_update(|q| q.filter(column, value, operator))
    }

    pub fn filter_by_key(&mut self, value: impl Into<KeyFilter>, operator: &str) -> Result<&mut Self> {
        self.try_update(|q| q.filter_by_key(value, operator))
    }

    /// Apply `callback` only when `condition` holds.
    pub fn when<F>(&mut self, condition: bool, callback: F) -> &mut Self
    where
        F: FnOnce(&mut Self),
    {
        self.when_else(condition, callback, |_| {})
    }

    /// Apply `callback` when `condition` holds, `default` otherwise.
    pub fn when_else<F, D>(&mut self, condition: bool, callback: F, default: D) -> &mut Self
    where
        F: FnOnce(&mut Self),
        D: FnOnce(&mut Self),
    {
        if condition {
            callback(self);
        } else {
            default(self);
        }
        self
    }

    // =========================================================================
    // DISPATCH BY NAME
    // =========================================================================

    /// Run a builder or read operation by name.
    pub async fn call(&mut self, method: &str, args: Vec<Value>) -> Result<CallOutcome> {
        match Operation::parse(&self.name, method, &args)? {
            Operation::Builder(op) => {
                self.update(|q| op.apply(q));
                Ok(CallOutcome::Applied)
            }
            Operation::Read(op) => Ok(CallOutcome::Read(self.read(op).await?)),
        }
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Run `operation` on the pending query, through the cache when one is
    /// attached, then reset.
    ///
    /// # Errors
    ///
    /// `ModelNotFound` when `findOrFail` matches nothing.
    pub async fn read(&mut self, operation: ReadOperation) -> Result<ReadResult> {
        let (spec, cache) = self.take_state();
        let must_exist = matches!(operation, ReadOperation::FindOrFail(_));
        let result = self.execute(cache.as_ref(), &spec, operation).await?;

        if must_exist && result.is_null() {
            return Err(self.not_found());
        }
        Ok(result)
    }

    fn not_found(&self) -> PersistenceError {
        PersistenceError::ModelNotFound {
            model: self.model.name.clone(),
        }
    }

    fn take_state(&mut self) -> (QuerySpec, Option<CacheStrategy>) {
        let spec = mem::replace(&mut self.query, QuerySpec::new(&self.model));
        (spec, self.cache.take())
    }

    async fn execute(&self, cache: Option<&CacheStrategy>, spec: &QuerySpec, operation: ReadOperation) -> Result<ReadResult> {
        match cache {
            None => self.source.execute(spec, &operation).await,
            Some(cache) => {
                let source = Arc::clone(&self.source);
                cache
                    .get(spec, operation, move |spec, op| async move { source.execute(&spec, &op).await })
                    .await
            }
        }
    }

    pub async fn all(&mut self) -> Result<Vec<Record>> {
        into_models(self.read(ReadOperation::All).await?)
    }

    pub async fn get(&mut self) -> Result<Vec<Record>> {
        into_models(self.read(ReadOperation::Get).await?)
    }

    pub async fn first(&mut self) -> Result<Option<Record>> {
        into_model(self.read(ReadOperation::First).await?)
    }

    pub async fn find(&mut self, id: impl Into<Value>) -> Result<Option<Record>> {
        into_model(self.read(ReadOperation::Find(id.into())).await?)
    }

    /// [`Self::find`], failing with `ModelNotFound` when no row has that key.
    pub async fn find_or_fail(&mut self, id: impl Into<Value>) -> Result<Record> {
        into_model(self.read(ReadOperation::FindOrFail(id.into())).await?)?.ok_or_else(|| self.not_found())
    }

    /// [`Self::first`], failing with `ModelNotFound` when nothing matches.
    pub async fn first_or_fail(&mut self) -> Result<Record> {
        self.first().await?.ok_or_else(|| self.not_found())
    }

    /// Matching rows, newest first by `column` (after any existing ordering).
    pub async fn latest(&mut self, column: impl Into<String>) -> Result<Vec<Record>> {
        into_models(self.read(ReadOperation::Latest(column.into())).await?)
    }

    pub async fn count(&mut self) -> Result<u64> {
        let value = into_scalar(self.read(ReadOperation::Count).await?)?;
        value
            .as_i64()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| unexpected("a count", &ReadResult::Scalar(value)))
    }

    pub async fn exists(&mut self) -> Result<bool> {
        into_bool(self.read(ReadOperation::Exists).await?)
    }

    pub async fn doesnt_exist(&mut self) -> Result<bool> {
        into_bool(self.read(ReadOperation::DoesntExist).await?)
    }

    pub async fn pluck(&mut self, column: impl Into<String>) -> Result<Vec<Value>> {
        match self.read(ReadOperation::Pluck(column.into())).await? {
            ReadResult::Values(values) => Ok(values),
            ReadResult::Null => Ok(Vec::new()),
            other => Err(unexpected("a value list", &other)),
        }
    }

    pub async fn sum(&mut self, column: impl Into<String>) -> Result<Value> {
        into_scalar(self.read(ReadOperation::Sum(column.into())).await?)
    }

    pub async fn avg(&mut self, column: impl Into<String>) -> Result<Value> {
        into_scalar(self.read(ReadOperation::Avg(column.into())).await?)
    }

    pub async fn min(&mut self, column: impl Into<String>) -> Result<Value> {
        into_scalar(self.read(ReadOperation::Min(column.into())).await?)
    }

    pub async fn max(&mut self, column: impl Into<String>) -> Result<Value> {
        into_scalar(self.read(ReadOperation::Max(column.into())).await?)
    }

    pub async fn paginate(&mut self, per_page: u64, page: u64) -> Result<Page> {
        let result = self.read(ReadOperation::Paginate { per_page, page }).await?;
        into_page(result, per_page, page, true)
    }

    pub async fn simple_paginate(&mut self, per_page: u64, page: u64) -> Result<Page> {
        let result = self.read(ReadOperation::SimplePaginate { per_page, page }).await?;
        into_page(result, per_page, page, false)
    }

    // =========================================================================
    // ITERATION
    // =========================================================================

    /// Walk the pending query page by page, ordered by key unless an order is
    /// already set. Returns `Ok(false)` when the callback stopped early.
    pub async fn chunk<F, Fut>(&mut self, size: u64, mut callback: F) -> Result<bool>
    where
        F: FnMut(Vec<Record>, u64) -> Fut,
        Fut: Future<Output = bool>,
    {
        positive("chunk", size)?;
        let (mut spec, cache) = self.take_state();
        if !spec.has_orders() {
            let key = spec.qualified_key();
            spec = spec.order_by(key, Direction::Asc);
        }

        let mut page = 1;
        loop {
            let page_spec = spec.clone().for_page(page, size);
            let records = into_models(self.execute(cache.as_ref(), &page_spec, ReadOperation::Get).await?)?;
            let fetched = records.len() as u64;

            if fetched == 0 {
                break;
            }
            if !callback(records, page).await {
                return Ok(false);
            }
            if fetched < size {
                break;
            }
            page += 1;
        }

        Ok(true)
    }

    /// Keyset iteration: each batch holds the next `size` rows whose key is
    /// greater than the last one seen.
    ///
    /// # Errors
    ///
    /// `CanNotSpecifyOrderByClause` when the pending query is already ordered.
    pub async fn chunk_by_id<F, Fut>(&mut self, size: u64, mut callback: F) -> Result<bool>
    where
        F: FnMut(Vec<Record>) -> Fut,
        Fut: Future<Output = bool>,
    {
        positive("chunkById", size)?;
        let (spec, cache) = self.take_state();
        if spec.has_orders() {
            return Err(PersistenceError::CanNotSpecifyOrderByClause);
        }

        let key_column = spec.qualified_key();
        let key_name = spec.key_name().to_string();
        let base = spec.order_by(key_column.clone(), Direction::Asc).limit(size);
        let mut last_key: Option<Value> = None;

        loop {
            let batch_spec = match &last_key {
                Some(last) => base.clone().where_compare(key_column.clone(), Operator::Gt, last.clone()),
                None => base.clone(),
            };
            let records = into_models(self.execute(cache.as_ref(), &batch_spec, ReadOperation::Get).await?)?;
            let fetched = records.len() as u64;

            if let Some(last) = records.last() {
                last_key = Some(last.key(&key_name).cloned().ok_or(PersistenceError::PrimaryKeyRequired)?);
                if !callback(records).await {
                    return Ok(false);
                }
            }
            if fetched < size {
                break;
            }
        }

        Ok(true)
    }

    /// Read batches of `size` from the same query until a batch comes back
    /// short. The callback is expected to change the data so that the next
    /// batch differs (for example by processing and removing rows).
    pub async fn do_while<F, Fut>(&mut self, size: u64, mut callback: F) -> Result<bool>
    where
        F: FnMut(Vec<Record>) -> Fut,
        Fut: Future<Output = bool>,
    {
        positive("doWhile", size)?;
        let (spec, cache) = self.take_state();
        let spec = spec.limit(size);

        loop {
            let records = into_models(self.execute(cache.as_ref(), &spec, ReadOperation::Get).await?)?;
            let fetched = records.len() as u64;

            if fetched == 0 {
                break;
            }
            if !callback(records).await {
                return Ok(false);
            }
            if fetched < size {
                break;
            }
        }

        Ok(true)
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("query", &self.query)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// RESULT SHAPES
// =============================================================================

fn positive(method: &str, size: u64) -> Result<()> {
    if size == 0 {
        return Err(PersistenceError::invalid_argument(method, "size must be greater than zero"));
    }
    Ok(())
}

fn unexpected(expected: &str, got: &ReadResult) -> PersistenceError {
    PersistenceError::DataSource(format!("expected {expected}, got {got:?}"))
}

fn into_models(result: ReadResult) -> Result<Vec<Record>> {
    match result {
        ReadResult::Null => Ok(Vec::new()),
        result if result.is_model_shaped() => Ok(result.into_records()),
        other => Err(unexpected("models", &other)),
    }
}

fn into_model(result: ReadResult) -> Result<Option<Record>> {
    match result {
        ReadResult::Null => Ok(None),
        ReadResult::Model(record) => Ok(Some(record)),
        ReadResult::Models(records) => Ok(records.into_iter().next()),
        other => Err(unexpected("a model", &other)),
    }
}

fn into_scalar(result: ReadResult) -> Result<Value> {
    match result {
        ReadResult::Scalar(value) => Ok(value),
        ReadResult::Null => Ok(Value::Null),
        other => Err(unexpected("a scalar", &other)),
    }
}

fn into_bool(result: ReadResult) -> Result<bool> {
    match result {
        ReadResult::Scalar(Value::Bool(b)) => Ok(b),
        other => Err(unexpected("a boolean", &other)),
    }
}

fn into_page(result: ReadResult, per_page: u64, page: u64, with_total: bool) -> Result<Page> {
    match result {
        ReadResult::Page(page) => Ok(page),
        ReadResult::Null => Ok(Page {
            items: Vec::new(),
            page,
            per_page,
            total: with_total.then_some(0),
        }),
        other => Err(unexpected("a page", &other)),
    }
}
