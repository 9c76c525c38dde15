//! Filter predicates, operators and ordering, plus their SQL rendering.

use std::fmt;
use std::str::FromStr;

use repocache_domain::Value;

use crate::error::{PersistenceError, Result};

/// Comparison operator accepted by the filter helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Only `=` and `!=` can be applied to a set of values.
    #[must_use]
    pub const fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }
}

impl FromStr for Operator {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "=" => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            other => Err(PersistenceError::InvalidOperator(other.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl FromStr for Direction {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(PersistenceError::invalid_argument(
                "orderBy",
                format!("direction must be asc or desc, got {other}"),
            )),
        }
    }
}

/// One `order by` entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

/// Value side of a filter: one value or a set of values.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyFilter {
    One(Value),
    Many(Vec<Value>),
}

impl From<Value> for KeyFilter {
    fn from(v: Value) -> Self {
        Self::One(v)
    }
}

impl From<i64> for KeyFilter {
    fn from(v: i64) -> Self {
        Self::One(Value::Int(v))
    }
}

impl From<&str> for KeyFilter {
    fn from(v: &str) -> Self {
        Self::One(Value::from(v))
    }
}

impl From<Vec<Value>> for KeyFilter {
    fn from(v: Vec<Value>) -> Self {
        Self::Many(v)
    }
}

impl From<Vec<i64>> for KeyFilter {
    fn from(v: Vec<i64>) -> Self {
        Self::Many(v.into_iter().map(Value::Int).collect())
    }
}

/// A single `where` clause. Predicates are joined with `and`.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column <op> ?`
    Compare {
        column: String,
        operator: Operator,
        value: Value,
    },
    /// `column [not] in (?, ...)`
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    /// `column is [not] null`
    Null { column: String, negated: bool },
    /// Set filter whose input contained `null`:
    /// `(column is null or column in (...))`, negated as
    /// `(column is not null and column not in (...))`.
    InOrNull {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
}

impl Predicate {
    #[must_use]
    pub fn column(&self) -> &str {
        match self {
            Self::Compare { column, .. }
            | Self::In { column, .. }
            | Self::Null { column, .. }
            | Self::InOrNull { column, .. } => column,
        }
    }

    pub(crate) fn push_bindings(&self, out: &mut Vec<Value>) {
        match self {
            Self::Compare { value, .. } => out.push(value.clone()),
            Self::In { values, .. } | Self::InOrNull { values, .. } => {
                out.extend(values.iter().cloned());
            }
            Self::Null { .. } => {}
        }
    }

    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Compare {
                column, operator, ..
            } => format!("{} {} ?", quote_identifier(column), operator.as_sql()),
            Self::In {
                column,
                values,
                negated,
            } => in_clause(column, values.len(), *negated),
            Self::Null { column, negated } => {
                let not = if *negated { "not " } else { "" };
                format!("{} is {not}null", quote_identifier(column))
            }
            Self::InOrNull {
                column,
                values,
                negated,
            } => {
                let quoted = quote_identifier(column);
                let set = in_clause(column, values.len(), *negated);
                if *negated {
                    format!("({quoted} is not null and {set})")
                } else {
                    format!("({quoted} is null or {set})")
                }
            }
        }
    }
}

fn in_clause(column: &str, count: usize, negated: bool) -> String {
    // An empty set matches nothing (or everything, negated).
    if count == 0 {
        return if negated { "1 = 1" } else { "0 = 1" }.to_string();
    }
    let placeholders = vec!["?"; count].join(", ");
    let not = if negated { "not " } else { "" };
    format!("{} {not}in ({placeholders})", quote_identifier(column))
}

/// `users.id` becomes `"users"."id"`; `*` stays bare.
#[must_use]
pub fn quote_identifier(identifier: &str) -> String {
    identifier
        .split('.')
        .map(|part| {
            if part == "*" {
                part.to_string()
            } else {
                format!("\"{}\"", part.replace('"', "\"\""))
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_parsing() {
        assert_eq!("=".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("<>".parse::<Operator>().unwrap(), Operator::Ne);
        assert_eq!(">=".parse::<Operator>().unwrap(), Operator::Ge);

        let err = "like".parse::<Operator>().unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidOperator(op) if op == "like"));
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users.id"), r#""users"."id""#);
        assert_eq!(quote_identifier("users.*"), r#""users".*"#);
        assert_eq!(quote_identifier("*"), "*");
    }

    #[test]
    fn test_predicate_sql() {
        let compare = Predicate::Compare {
            column: "users.age".into(),
            operator: Operator::Gt,
            value: Value::Int(18),
        };
        assert_eq!(compare.to_sql(), r#""users"."age" > ?"#);

        let not_in = Predicate::In {
            column: "users.id".into(),
            values: vec![Value::Int(1), Value::Int(2)],
            negated: true,
        };
        assert_eq!(not_in.to_sql(), r#""users"."id" not in (?, ?)"#);

        let empty = Predicate::In { column: "id".into(), values: vec![], negated: false };
        assert_eq!(empty.to_sql(), "0 = 1");

        let nullable = Predicate::InOrNull {
            column: "id".into(),
            values: vec![Value::Int(4)],
            negated: false,
        };
        assert_eq!(nullable.to_sql(), r#"("id" is null or "id" in (?))"#);
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("DESC".parse::<Direction>().unwrap(), Direction::Desc);
        assert!("sideways".parse::<Direction>().is_err());
    }
}
