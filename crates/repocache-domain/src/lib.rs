//! # Repocache Domain Model
//!
//! Value types shared by the repository facade, the caching strategies and
//! the data sources. Everything a read operation can produce is expressed as
//! a [`ReadResult`], so the cache layer can classify results without
//! reflection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// VALUE OBJECTS
// =============================================================================

/// Dynamically typed scalar as it travels between the query layer, the data
/// source and the cache store.
///
/// Serialized untagged, so `[7, "a", null]` is the JSON form of
/// `[Int(7), Text("a"), Null]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view used by aggregates; integers widen to `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// A single model-shaped row: column name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    attributes: BTreeMap<String, Value>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(column.into(), value.into());
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(column.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    /// Primary key value of this record.
    ///
    /// A missing column and an explicit `Null` both mean the key was not
    /// selected.
    #[must_use]
    pub fn key(&self, key_name: &str) -> Option<&Value> {
        self.get(key_name).filter(|v| !v.is_null())
    }

    /// Projection onto `columns`; columns the record lacks are skipped.
    #[must_use]
    pub fn only(&self, columns: &[String]) -> Self {
        let attributes = columns
            .iter()
            .filter_map(|c| self.attributes.get(c).map(|v| (c.clone(), v.clone())))
            .collect();
        Self { attributes }
    }

    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            attributes: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// One page of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<Record>,
    pub page: u64,
    pub per_page: u64,
    /// Total matching rows; `None` for simple (cursor-less) pagination.
    pub total: Option<u64>,
}

impl Page {
    #[must_use]
    pub fn last_page(&self) -> Option<u64> {
        self.total
            .map(|total| if self.per_page == 0 { 1 } else { total.div_ceil(self.per_page).max(1) })
    }

    #[must_use]
    pub fn has_more_pages(&self) -> bool {
        match self.last_page() {
            Some(last) => self.page < last,
            None => self.items.len() as u64 >= self.per_page && self.per_page > 0,
        }
    }
}

// =============================================================================
// READ RESULTS
// =============================================================================

/// Everything a read operation can return.
///
/// `Model`, `Models` and `Page` are model-shaped: their records carry a
/// primary key and can be re-resolved by identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ReadResult {
    Null,
    Scalar(Value),
    Values(Vec<Value>),
    Model(Record),
    Models(Vec<Record>),
    Page(Page),
}

impl ReadResult {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn is_model_shaped(&self) -> bool {
        matches!(self, Self::Model(_) | Self::Models(_) | Self::Page(_))
    }

    /// Records held by a model-shaped result, in order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        match self {
            Self::Model(record) => std::slice::from_ref(record),
            Self::Models(records) => records,
            Self::Page(page) => &page.items,
            Self::Null | Self::Scalar(_) | Self::Values(_) => &[],
        }
    }

    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Model(record) => vec![record],
            Self::Models(records) => records,
            Self::Page(page) => page.items,
            Self::Null | Self::Scalar(_) | Self::Values(_) => Vec::new(),
        }
    }

    #[must_use]
    pub const fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(v) => Some(v),
            _ => None,
        }
    }
}

// =============================================================================
// MODEL DEFINITIONS
// =============================================================================

/// Static description of the model a repository serves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelDefinition {
    /// Model name used in error messages (`User`).
    pub name: String,
    /// Backing table (`users`).
    pub table: String,
    /// Primary key column (`id`).
    pub key_name: String,
}

impl ModelDefinition {
    /// Model with the conventional `id` primary key.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            key_name: "id".to_string(),
        }
    }

    #[must_use]
    pub fn with_key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = key_name.into();
        self
    }

    /// `table.key`
    #[must_use]
    pub fn qualified_key(&self) -> String {
        format!("{}.{}", self.table, self.key_name)
    }
}
