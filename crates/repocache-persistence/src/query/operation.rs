//! Closed enumeration of the operations a repository accepts by name.
//!
//! Read operations are terminal: they run through the attached cache strategy
//! and reset the repository. Builder operations only refine the pending
//! [`QuerySpec`].

use repocache_domain::Value;

use super::predicate::Direction;
use super::spec::QuerySpec;
use crate::error::{PersistenceError, Result};

/// Default page size for `paginate` / `forPage` when none is given.
pub const DEFAULT_PER_PAGE: u64 = 15;

/// Column `latest` orders by when none is given.
pub const DEFAULT_LATEST_COLUMN: &str = "created_at";

// =============================================================================
// READ OPERATIONS
// =============================================================================

/// Terminal read operation together with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOperation {
    All,
    Get,
    First,
    Find(Value),
    FindOrFail(Value),
    Latest(String),
    Count,
    Exists,
    DoesntExist,
    Pluck(String),
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
    Paginate { per_page: u64, page: u64 },
    SimplePaginate { per_page: u64, page: u64 },
}

impl ReadOperation {
    /// Name used for dispatch and as the fingerprint's operation name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Get => "get",
            Self::First => "first",
            Self::Find(_) => "find",
            Self::FindOrFail(_) => "findOrFail",
            Self::Latest(_) => "latest",
            Self::Count => "count",
            Self::Exists => "exists",
            Self::DoesntExist => "doesntExist",
            Self::Pluck(_) => "pluck",
            Self::Sum(_) => "sum",
            Self::Avg(_) => "avg",
            Self::Min(_) => "min",
            Self::Max(_) => "max",
            Self::Paginate { .. } => "paginate",
            Self::SimplePaginate { .. } => "simplePaginate",
        }
    }

    /// Argument list in call order.
    #[must_use]
    pub fn arguments(&self) -> Vec<Value> {
        match self {
            Self::All
            | Self::Get
            | Self::First
            | Self::Count
            | Self::Exists
            | Self::DoesntExist => Vec::new(),
            Self::Find(id) | Self::FindOrFail(id) => vec![id.clone()],
            Self::Latest(column)
            | Self::Pluck(column)
            | Self::Sum(column)
            | Self::Avg(column)
            | Self::Min(column)
            | Self::Max(column) => vec![Value::from(column.as_str())],
            Self::Paginate { per_page, page } | Self::SimplePaginate { per_page, page } => {
                vec![to_value(*per_page), to_value(*page)]
            }
        }
    }

    /// True for operations that ignore the pending filters entirely.
    ///
    /// Replaying such an operation against a narrowed specification would
    /// discard the narrowing, so it must be swapped for its filtered
    /// counterpart first.
    #[must_use]
    pub const fn is_full_scan(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Operation to run against a specification narrowed to a set of keys.
    ///
    /// Full scans become `get`. Paginated reads restart at page 1, since the
    /// key set already is the requested page; the caller restores the
    /// requested page number and total.
    #[must_use]
    pub fn narrowed(self) -> Self {
        match self {
            op if op.is_full_scan() => Self::Get,
            Self::Paginate { per_page, .. } => Self::Paginate { per_page, page: 1 },
            Self::SimplePaginate { per_page, .. } => Self::SimplePaginate { per_page, page: 1 },
            op => op,
        }
    }

    /// Parse a read operation by name. `Ok(None)` means the name is not a
    /// read operation.
    pub fn parse(name: &str, args: &[Value]) -> Result<Option<Self>> {
        let op = match name {
            "all" => Self::All,
            "get" => Self::Get,
            "first" => Self::First,
            "find" => Self::Find(arg(name, args, 0)?.clone()),
            "findOrFail" => Self::FindOrFail(arg(name, args, 0)?.clone()),
            "latest" => Self::Latest(match args.first() {
                None | Some(Value::Null) => DEFAULT_LATEST_COLUMN.to_string(),
                Some(_) => arg_text(name, args, 0)?,
            }),
            "count" => Self::Count,
            "exists" => Self::Exists,
            "doesntExist" => Self::DoesntExist,
            "pluck" => Self::Pluck(arg_text(name, args, 0)?),
            "sum" => Self::Sum(arg_text(name, args, 0)?),
            "avg" => Self::Avg(arg_text(name, args, 0)?),
            "min" => Self::Min(arg_text(name, args, 0)?),
            "max" => Self::Max(arg_text(name, args, 0)?),
            "paginate" => Self::Paginate {
                per_page: arg_u64_or(name, args, 0, DEFAULT_PER_PAGE)?,
                page: arg_u64_or(name, args, 1, 1)?,
            },
            "simplePaginate" => Self::SimplePaginate {
                per_page: arg_u64_or(name, args, 0, DEFAULT_PER_PAGE)?,
                page: arg_u64_or(name, args, 1, 1)?,
            },
            _ => return Ok(None),
        };
        Ok(Some(op))
    }
}

// =============================================================================
// BUILDER OPERATIONS
// =============================================================================

/// Non-terminal operation refining the pending query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderOperation {
    Distinct,
    ForPage { page: u64, per_page: u64 },
    GroupBy(Vec<String>),
    OrderBy { column: String, direction: Direction },
    Limit(u64),
    Select(Vec<String>),
    Skip(u64),
    WhereNull(String),
    WhereNotNull(String),
}

impl BuilderOperation {
    pub fn parse(name: &str, args: &[Value]) -> Result<Option<Self>> {
        let op = match name {
            "distinct" => Self::Distinct,
            "forPage" => Self::ForPage {
                page: arg_u64(name, args, 0)?,
                per_page: arg_u64_or(name, args, 1, DEFAULT_PER_PAGE)?,
            },
            "groupBy" => {
                if args.is_empty() {
                    return Err(PersistenceError::invalid_argument(name, "expected at least one column"));
                }
                Self::GroupBy(texts(name, args)?)
            }
            "orderBy" => Self::OrderBy {
                column: arg_text(name, args, 0)?,
                direction: match args.get(1) {
                    Some(_) => arg_text(name, args, 1)?.parse()?,
                    None => Direction::Asc,
                },
            },
            "limit" | "take" => Self::Limit(arg_u64(name, args, 0)?),
            "skip" | "offset" => Self::Skip(arg_u64(name, args, 0)?),
            "select" => Self::Select(texts(name, args)?),
            "whereNull" => Self::WhereNull(arg_text(name, args, 0)?),
            "whereNotNull" => Self::WhereNotNull(arg_text(name, args, 0)?),
            _ => return Ok(None),
        };
        Ok(Some(op))
    }

    #[must_use]
    pub fn apply(self, spec: QuerySpec) -> QuerySpec {
        match self {
            Self::Distinct => spec.distinct(),
            Self::ForPage { page, per_page } => spec.for_page(page, per_page),
            Self::GroupBy(columns) => spec.group_by(columns),
            Self::OrderBy { column, direction } => spec.order_by(column, direction),
            Self::Limit(n) => spec.limit(n),
            Self::Select(columns) => spec.select(columns),
            Self::Skip(n) => spec.offset(n),
            Self::WhereNull(column) => spec.where_null(column, false),
            Self::WhereNotNull(column) => spec.where_null(column, true),
        }
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Anything a repository can be asked to do by name.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Builder(BuilderOperation),
    Read(ReadOperation),
}

impl Operation {
    /// Resolve `method` against both enumerations.
    ///
    /// # Errors
    ///
    /// `MethodNotFound` when the name is in neither, `InvalidArgument` when
    /// the arguments don't fit the operation.
    pub fn parse(repository: &str, method: &str, args: &[Value]) -> Result<Self> {
        if let Some(op) = ReadOperation::parse(method, args)? {
            return Ok(Self::Read(op));
        }
        if let Some(op) = BuilderOperation::parse(method, args)? {
            return Ok(Self::Builder(op));
        }
        Err(PersistenceError::MethodNotFound {
            repository: repository.to_string(),
            method: method.to_string(),
        })
    }
}

// =============================================================================
// ARGUMENT HELPERS
// =============================================================================

fn to_value(n: u64) -> Value {
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

fn arg<'a>(method: &str, args: &'a [Value], index: usize) -> Result<&'a Value> {
    args.get(index).ok_or_else(|| {
        PersistenceError::invalid_argument(method, format!("missing argument #{}", index + 1))
    })
}

fn arg_text(method: &str, args: &[Value], index: usize) -> Result<String> {
    match arg(method, args, index)? {
        Value::Text(s) => Ok(s.clone()),
        other => Err(PersistenceError::invalid_argument(
            method,
            format!("argument #{} must be a string, got {other}", index + 1),
        )),
    }
}

fn arg_u64(method: &str, args: &[Value], index: usize) -> Result<u64> {
    let value = arg(method, args, index)?;
    value
        .as_i64()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| {
            PersistenceError::invalid_argument(
                method,
                format!("argument #{} must be a non-negative integer, got {value}", index + 1),
            )
        })
}

fn arg_u64_or(method: &str, args: &[Value], index: usize, default: u64) -> Result<u64> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(default),
        Some(_) => arg_u64(method, args, index),
    }
}

fn texts(method: &str, args: &[Value]) -> Result<Vec<String>> {
    (0..args.len()).map(|i| arg_text(method, args, i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use repocache_domain::ModelDefinition;

    #[test]
    fn test_read_operation_names_round_trip() {
        let ops = [
            ReadOperation::All,
            ReadOperation::Find(Value::Int(3)),
            ReadOperation::FindOrFail(Value::Int(8)),
            ReadOperation::Latest("created_at".into()),
            ReadOperation::Pluck("email".into()),
            ReadOperation::Paginate { per_page: 10, page: 2 },
            ReadOperation::DoesntExist,
        ];
        for op in ops {
            let parsed = ReadOperation::parse(op.name(), &op.arguments()).unwrap();
            assert_eq!(parsed, Some(op));
        }
    }

    #[test]
    fn test_full_scan_narrows_to_get() {
        assert!(ReadOperation::All.is_full_scan());
        assert_eq!(ReadOperation::All.narrowed(), ReadOperation::Get);
        assert_eq!(ReadOperation::First.narrowed(), ReadOperation::First);
        assert_eq!(
            ReadOperation::Paginate { per_page: 10, page: 4 }.narrowed(),
            ReadOperation::Paginate { per_page: 10, page: 1 }
        );
    }

    #[test]
    fn test_latest_defaults_to_created_at() {
        let op = ReadOperation::parse("latest", &[]).unwrap();
        assert_eq!(op, Some(ReadOperation::Latest("created_at".into())));

        let op = ReadOperation::parse("latest", &[Value::from("updated_at")]).unwrap();
        assert_eq!(op, Some(ReadOperation::Latest("updated_at".into())));
    }

    #[test]
    fn test_find_or_fail_requires_id() {
        let op = Operation::parse("UserRepository", "findOrFail", &[Value::Int(4)]).unwrap();
        assert_eq!(op, Operation::Read(ReadOperation::FindOrFail(Value::Int(4))));

        let err = Operation::parse("UserRepository", "findOrFail", &[]).unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidArgument { method, .. } if method == "findOrFail"));
    }

    #[test]
    fn test_paginate_defaults() {
        let op = ReadOperation::parse("paginate", &[]).unwrap();
        assert_eq!(op, Some(ReadOperation::Paginate { per_page: DEFAULT_PER_PAGE, page: 1 }));
    }

    #[test]
    fn test_unknown_method() {
        let err = Operation::parse("UserRepository", "truncate", &[]).unwrap_err();
        match err {
            PersistenceError::MethodNotFound { repository, method } => {
                assert_eq!(repository, "UserRepository");
                assert_eq!(method, "truncate");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_arguments() {
        let err = Operation::parse("UserRepository", "limit", &[Value::from("ten")]).unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidArgument { method, .. } if method == "limit"));

        let err = Operation::parse("UserRepository", "pluck", &[]).unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidArgument { .. }));

        let err = Operation::parse("UserRepository", "take", &[Value::Int(-1)]).unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidArgument { .. }));
    }

    #[test]
    fn test_builder_dispatch_applies() {
        let spec = QuerySpec::new(&ModelDefinition::new("User", "users"));
        let ops = [
            ("select", vec![Value::from("id"), Value::from("name")]),
            ("orderBy", vec![Value::from("name"), Value::from("desc")]),
            ("take", vec![Value::Int(5)]),
            ("whereNotNull", vec![Value::from("email")]),
        ];

        let spec = ops.into_iter().fold(spec, |spec, (name, args)| {
            match Operation::parse("UserRepository", name, &args).unwrap() {
                Operation::Builder(op) => op.apply(spec),
                Operation::Read(op) => panic!("{} is not a builder", op.name()),
            }
        });

        assert_eq!(
            spec.to_sql(),
            r#"select "id", "name" from "users" where "email" is not null order by "name" desc limit 5"#
        );
    }
}
