//! Immutable query specification.
//!
//! A [`QuerySpec`] is the query state a repository accumulates between
//! terminal operations. Builder methods consume the value and return the
//! updated copy, so a replay can derive a narrowed specification without
//! touching the one the caller holds.

use repocache_domain::{ModelDefinition, Value};

use super::predicate::{quote_identifier, Direction, KeyFilter, Operator, Order, Predicate};
use crate::error::{PersistenceError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    table: String,
    key_name: String,
    columns: Vec<String>,
    distinct: bool,
    wheres: Vec<Predicate>,
    groups: Vec<String>,
    orders: Vec<Order>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl QuerySpec {
    /// Empty specification selecting every column of the model's table.
    #[must_use]
    pub fn new(model: &ModelDefinition) -> Self {
        Self::for_table(&model.table, &model.key_name)
    }

    pub fn for_table(table: impl Into<String>, key_name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key_name: key_name.into(),
            columns: Vec::new(),
            distinct: false,
            wheres: Vec::new(),
            groups: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Unqualified primary key column of the active model.
    #[must_use]
    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    #[must_use]
    pub fn qualified_key(&self) -> String {
        self.column(&self.key_name)
    }

    /// Qualify `name` with the table unless it already names one.
    #[must_use]
    pub fn column(&self, name: &str) -> String {
        if name.contains('.') {
            name.to_string()
        } else {
            format!("{}.{name}", self.table)
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub const fn is_distinct(&self) -> bool {
        self.distinct
    }

    #[must_use]
    pub fn wheres(&self) -> &[Predicate] {
        &self.wheres
    }

    #[must_use]
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    #[must_use]
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    #[must_use]
    pub fn has_orders(&self) -> bool {
        !self.orders.is_empty()
    }

    #[must_use]
    pub const fn row_limit(&self) -> Option<u64> {
        self.limit
    }

    #[must_use]
    pub const fn row_offset(&self) -> Option<u64> {
        self.offset
    }

    // =========================================================================
    // BUILDERS
    // =========================================================================

    /// Replace the selected columns. An empty list selects `*`.
    #[must_use]
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns
            .into_iter()
            .map(Into::into)
            .filter(|c: &String| c != "*")
            .collect();
        self
    }

    #[must_use]
    pub const fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    #[must_use]
    pub fn where_compare(mut self, column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        self.wheres.push(Predicate::Compare {
            column: column.into(),
            operator,
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn where_in(mut self, column: impl Into<String>, values: Vec<Value>, negated: bool) -> Self {
        self.wheres.push(Predicate::In {
            column: column.into(),
            values,
            negated,
        });
        self
    }

    #[must_use]
    pub fn where_null(mut self, column: impl Into<String>, negated: bool) -> Self {
        self.wheres.push(Predicate::Null {
            column: column.into(),
            negated,
        });
        self
    }

    #[must_use]
    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(columns.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.orders.push(Order {
            column: column.into(),
            direction,
        });
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// `limit per_page offset (page - 1) * per_page`; pages start at 1.
    #[must_use]
    pub const fn for_page(self, page: u64, per_page: u64) -> Self {
        let page = if page == 0 { 1 } else { page };
        self.offset((page - 1).saturating_mul(per_page)).limit(per_page)
    }

    /// Filter `column` by one value or a set of values.
    ///
    /// A single value accepts every [`Operator`]; comparing with `null`
    /// through `=`/`!=` becomes `is [not] null`. A set only accepts `=` and
    /// `!=`, which become `in` / `not in`.
    pub fn filter(self, column: impl Into<String>, value: impl Into<KeyFilter>, operator: &str) -> Result<Self> {
        let operator: Operator = operator.parse()?;
        let column = column.into();

        match value.into() {
            KeyFilter::One(Value::Null) if operator.is_equality() => {
                Ok(self.where_null(column, operator == Operator::Ne))
            }
            KeyFilter::One(value) => Ok(self.where_compare(column, operator, value)),
            KeyFilter::Many(values) => {
                if !operator.is_equality() {
                    return Err(PersistenceError::InvalidOperator(operator.to_string()));
                }
                let negated = operator == Operator::Ne;
                if values.iter().any(Value::is_null) {
                    let values = values.into_iter().filter(|v| !v.is_null()).collect();
                    let mut spec = self;
                    spec.wheres.push(Predicate::InOrNull {
                        column,
                        values,
                        negated,
                    });
                    Ok(spec)
                } else {
                    Ok(self.where_in(column, values, negated))
                }
            }
        }
    }

    /// [`Self::filter`] on the qualified primary key.
    pub fn filter_by_key(self, value: impl Into<KeyFilter>, operator: &str) -> Result<Self> {
        let column = self.qualified_key();
        self.filter(column, value, operator)
    }

    /// Drop every filter predicate together with its bound values.
    #[must_use]
    pub fn without_filters(mut self) -> Self {
        self.wheres.clear();
        self
    }

    /// Specification used to replay a cached id set: filters and paging
    /// cleared, then exactly one `key in (ids)` predicate. Selection,
    /// grouping and ordering are kept; the ids already are the window.
    #[must_use]
    pub fn restricted_to_keys(mut self, ids: Vec<Value>) -> Self {
        let column = self.qualified_key();
        self.limit = None;
        self.offset = None;
        self.without_filters().where_in(column, ids, false)
    }

    // =========================================================================
    // COMPILATION
    // =========================================================================

    /// Bound parameters in the order their placeholders appear.
    #[must_use]
    pub fn bindings(&self) -> Vec<Value> {
        let mut bindings = Vec::new();
        for predicate in &self.wheres {
            predicate.push_bindings(&mut bindings);
        }
        bindings
    }

    /// Compiled statement text with `?` placeholders.
    #[must_use]
    pub fn to_sql(&self) -> String {
        let mut sql = String::from("select ");
        if self.distinct {
            sql.push_str("distinct ");
        }

        if self.columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&join_identifiers(&self.columns));
        }

        sql.push_str(" from ");
        sql.push_str(&quote_identifier(&self.table));

        if !self.wheres.is_empty() {
            let clauses: Vec<String> = self.wheres.iter().map(Predicate::to_sql).collect();
            sql.push_str(" where ");
            sql.push_str(&clauses.join(" and "));
        }

        if !self.groups.is_empty() {
            sql.push_str(" group by ");
            sql.push_str(&join_identifiers(&self.groups));
        }

        if !self.orders.is_empty() {
            let orders: Vec<String> = self
                .orders
                .iter()
                .map(|o| format!("{} {}", quote_identifier(&o.column), o.direction.as_sql()))
                .collect();
            sql.push_str(" order by ");
            sql.push_str(&orders.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" limit {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" offset {offset}"));
        }

        sql
    }
}

fn join_identifiers(identifiers: &[String]) -> String {
    identifiers
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}
