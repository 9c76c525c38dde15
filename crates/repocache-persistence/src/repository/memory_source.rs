//! In-memory data source.
//!
//! Evaluates a [`QuerySpec`] against tables held in memory and keeps a log of
//! every statement it ran, which makes cache round-trips observable.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use repocache_domain::{Page, ReadResult, Record, Value};
use tokio::sync::RwLock;

use super::traits::DataSource;
use crate::error::{PersistenceError, Result};
use crate::query::{Direction, Operator, Order, Predicate, QuerySpec, ReadOperation};

/// One statement executed by [`MemorySource`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub operation: &'static str,
    pub sql: String,
    pub bindings: Vec<Value>,
}

#[derive(Debug, Default)]
pub struct MemorySource {
    tables: RwLock<HashMap<String, Vec<Record>>>,
    log: RwLock<Vec<ExecutedStatement>>,
}

impl MemorySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `table` if it doesn't exist yet.
    pub async fn create_table(&self, table: &str) {
        self.tables.write().await.entry(table.to_string()).or_default();
    }

    pub async fn insert(&self, table: &str, record: Record) {
        self.tables.write().await.entry(table.to_string()).or_default().push(record);
    }

    pub async fn insert_many(&self, table: &str, records: impl IntoIterator<Item = Record>) {
        self.tables.write().await.entry(table.to_string()).or_default().extend(records);
    }

    /// Set `column` on the row whose `key_name` equals `key`. Returns whether
    /// a row matched.
    pub async fn update(&self, table: &str, key_name: &str, key: &Value, column: &str, value: impl Into<Value>) -> bool {
        let mut tables = self.tables.write().await;
        let row = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| r.key(key_name) == Some(key)));

        match row {
            Some(row) => {
                row.set(column, value);
                true
            }
            None => false,
        }
    }

    /// Remove the row whose `key_name` equals `key`.
    pub async fn delete(&self, table: &str, key_name: &str, key: &Value) -> bool {
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(table) else {
            return false;
        };
        let before = rows.len();
        rows.retain(|r| r.key(key_name) != Some(key));
        rows.len() != before
    }

    /// Number of statements executed so far.
    pub async fn execution_count(&self) -> usize {
        self.log.read().await.len()
    }

    pub async fn executed(&self) -> Vec<ExecutedStatement> {
        self.log.read().await.clone()
    }

    async fn rows(&self, table: &str) -> Result<Vec<Record>> {
        self.tables
            .read()
            .await
            .get(table)
            .cloned()
            .ok_or_else(|| PersistenceError::DataSource(format!("table {table} does not exist")))
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn execute(&self, spec: &QuerySpec, operation: &ReadOperation) -> Result<ReadResult> {
        let latest;
        let spec = match operation {
            ReadOperation::Latest(column) => {
                latest = spec.clone().order_by(column.clone(), Direction::Desc);
                &latest
            }
            _ => spec,
        };

        let statement = ExecutedStatement {
            operation: operation.name(),
            sql: spec.to_sql(),
            bindings: spec.bindings(),
        };
        tracing::debug!(operation = statement.operation, sql = %statement.sql, "Executing statement");
        self.log.write().await.push(statement);

        let rows = self.rows(spec.table()).await?;
        Ok(evaluate(spec, operation, rows))
    }
}

// =============================================================================
// EVALUATION
// =============================================================================

fn evaluate(spec: &QuerySpec, operation: &ReadOperation, rows: Vec<Record>) -> ReadResult {
    // A full scan reads the whole table regardless of the pending query.
    if operation.is_full_scan() {
        return ReadResult::Models(rows.iter().map(|r| project(spec, r)).collect());
    }

    let key = unqualified(spec.key_name()).to_string();
    let mut rows: Vec<Record> = rows.into_iter().filter(|r| matches_all(spec.wheres(), r)).collect();

    if let ReadOperation::Find(id) | ReadOperation::FindOrFail(id) = operation {
        rows.retain(|r| r.key(&key) == Some(id));
    }

    if !spec.groups().is_empty() {
        rows = group(spec.groups(), rows);
    }
    sort(spec.orders(), &mut rows);

    match operation {
        ReadOperation::All | ReadOperation::Get | ReadOperation::Latest(_) => ReadResult::Models(window(spec, &rows)),
        ReadOperation::First | ReadOperation::Find(_) | ReadOperation::FindOrFail(_) => {
            window(spec, &rows).into_iter().next().map_or(ReadResult::Null, ReadResult::Model)
        }
        ReadOperation::Count => ReadResult::Scalar(Value::Int(len(&rows))),
        ReadOperation::Exists => ReadResult::Scalar(Value::Bool(!rows.is_empty())),
        ReadOperation::DoesntExist => ReadResult::Scalar(Value::Bool(rows.is_empty())),
        ReadOperation::Pluck(column) => {
            let column = unqualified(column);
            ReadResult::Values(
                window(spec, &rows)
                    .iter()
                    .map(|r| r.get(column).cloned().unwrap_or_default())
                    .collect(),
            )
        }
        ReadOperation::Sum(column) => sum(&column_values(&rows, column)),
        ReadOperation::Avg(column) => avg(&column_values(&rows, column)),
        ReadOperation::Min(column) => extreme(column_values(&rows, column), Ordering::Less),
        ReadOperation::Max(column) => extreme(column_values(&rows, column), Ordering::Greater),
        ReadOperation::Paginate { per_page, page } => ReadResult::Page(paginate(spec, &rows, *per_page, *page, true)),
        ReadOperation::SimplePaginate { per_page, page } => {
            ReadResult::Page(paginate(spec, &rows, *per_page, *page, false))
        }
    }
}

fn unqualified(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

fn field<'a>(record: &'a Record, column: &str) -> &'a Value {
    static NULL: Value = Value::Null;
    record.get(unqualified(column)).unwrap_or(&NULL)
}

fn len(rows: &[Record]) -> i64 {
    i64::try_from(rows.len()).unwrap_or(i64::MAX)
}

fn matches_all(predicates: &[Predicate], record: &Record) -> bool {
    predicates.iter().all(|p| matches(p, record))
}

fn matches(predicate: &Predicate, record: &Record) -> bool {
    match predicate {
        Predicate::Compare { column, operator, value } => {
            let ordering = compare(field(record, column), value);
            match operator {
                Operator::Eq => ordering == Some(Ordering::Equal),
                Operator::Ne => ordering.is_some_and(Ordering::is_ne),
                Operator::Lt => ordering == Some(Ordering::Less),
                Operator::Le => ordering.is_some_and(Ordering::is_le),
                Operator::Gt => ordering == Some(Ordering::Greater),
                Operator::Ge => ordering.is_some_and(Ordering::is_ge),
            }
        }
        Predicate::In { column, values, negated } => {
            let current = field(record, column);
            !current.is_null() && contains(values, current) != *negated
        }
        Predicate::Null { column, negated } => field(record, column).is_null() != *negated,
        Predicate::InOrNull { column, values, negated } => {
            let current = field(record, column);
            if *negated {
                !current.is_null() && !contains(values, current)
            } else {
                current.is_null() || contains(values, current)
            }
        }
    }
}

fn contains(values: &[Value], needle: &Value) -> bool {
    values.iter().any(|v| compare(v, needle) == Some(Ordering::Equal))
}

/// SQL-style comparison: anything involving `null`, or values of unrelated
/// types, is unknown.
#[allow(clippy::cast_precision_loss)]
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total order used for sorting: nulls first, then booleans, numbers, text.
fn sort_key_cmp(a: &Value, b: &Value) -> Ordering {
    const fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
        }
    }
    compare(a, b).unwrap_or_else(|| rank(a).cmp(&rank(b)))
}

fn sort(orders: &[Order], rows: &mut [Record]) {
    if orders.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        orders
            .iter()
            .map(|o| {
                let ordering = sort_key_cmp(field(a, &o.column), field(b, &o.column));
                match o.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

/// Keep the first row of every group.
fn group(columns: &[String], rows: Vec<Record>) -> Vec<Record> {
    let mut seen: Vec<Vec<Value>> = Vec::new();
    rows.into_iter()
        .filter(|r| {
            let group_key: Vec<Value> = columns.iter().map(|c| field(r, c).clone()).collect();
            if seen.contains(&group_key) {
                false
            } else {
                seen.push(group_key);
                true
            }
        })
        .collect()
}

fn project(spec: &QuerySpec, record: &Record) -> Record {
    if spec.columns().is_empty() {
        return record.clone();
    }
    let columns: Vec<String> = spec.columns().iter().map(|c| unqualified(c).to_string()).collect();
    record.only(&columns)
}

fn distinct(spec: &QuerySpec, rows: Vec<Record>) -> Vec<Record> {
    if !spec.is_distinct() {
        return rows;
    }
    let mut unique: Vec<Record> = Vec::with_capacity(rows.len());
    for row in rows {
        if !unique.contains(&row) {
            unique.push(row);
        }
    }
    unique
}

fn usize_of(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

/// Projection, distinct, then offset/limit.
fn window(spec: &QuerySpec, rows: &[Record]) -> Vec<Record> {
    let projected = distinct(spec, rows.iter().map(|r| project(spec, r)).collect());
    let offset = spec.row_offset().map_or(0, usize_of);
    let limit = spec.row_limit().map_or(usize::MAX, usize_of);
    projected.into_iter().skip(offset).take(limit).collect()
}

fn paginate(spec: &QuerySpec, rows: &[Record], per_page: u64, page: u64, with_total: bool) -> Page {
    let page = page.max(1);
    let projected = distinct(spec, rows.iter().map(|r| project(spec, r)).collect());
    let total = projected.len() as u64;
    let items = projected
        .into_iter()
        .skip(usize_of((page - 1).saturating_mul(per_page)))
        .take(usize_of(per_page))
        .collect();

    Page {
        items,
        page,
        per_page,
        total: with_total.then_some(total),
    }
}

fn column_values(rows: &[Record], column: &str) -> Vec<Value> {
    rows.iter()
        .map(|r| field(r, column).clone())
        .filter(|v| !v.is_null())
        .collect()
}

fn sum(values: &[Value]) -> ReadResult {
    if values.iter().all(|v| matches!(v, Value::Int(_))) {
        let total = values.iter().filter_map(Value::as_i64).fold(0_i64, i64::saturating_add);
        return ReadResult::Scalar(Value::Int(total));
    }
    ReadResult::Scalar(Value::Float(values.iter().filter_map(Value::as_f64).sum()))
}

#[allow(clippy::cast_precision_loss)]
fn avg(values: &[Value]) -> ReadResult {
    let numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
    if numbers.is_empty() {
        return ReadResult::Null;
    }
    ReadResult::Scalar(Value::Float(numbers.iter().sum::<f64>() / numbers.len() as f64))
}

fn extreme(values: Vec<Value>, wanted: Ordering) -> ReadResult {
    values
        .into_iter()
        .reduce(|best, v| if sort_key_cmp(&v, &best) == wanted { v } else { best })
        .map_or(ReadResult::Null, ReadResult::Scalar)
}
