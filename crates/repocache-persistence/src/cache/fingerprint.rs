//! Deterministic cache keys for pending read operations.

use std::fmt;

use repocache_domain::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::query::{QuerySpec, ReadOperation};
use crate::strategy::StrategyKind;

/// Hex-encoded SHA-256 fingerprint of one pending read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of `operation` run against `spec` under the given strategy.
    pub fn for_query(kind: StrategyKind, operation: &ReadOperation, spec: &QuerySpec) -> Result<Self> {
        compute_key(
            kind.prefix(),
            operation.name(),
            &operation.arguments(),
            &spec.to_sql(),
            &spec.bindings(),
        )
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hash `"{prefix}:{name}({arguments}):{sql}_{bindings}"`, with arguments
/// and bindings rendered as JSON arrays.
pub fn compute_key(
    prefix: &str,
    name: &str,
    arguments: &[Value],
    sql: &str,
    bindings: &[Value],
) -> Result<CacheKey> {
    let arguments = serde_json::to_string(arguments)?;
    let bindings = serde_json::to_string(bindings)?;
    let material = format!("{prefix}:{name}({arguments}):{sql}_{bindings}");

    let digest = Sha256::digest(material.as_bytes());
    Ok(CacheKey(hex::encode(digest)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Operator;
    use repocache_domain::ModelDefinition;

    const SQL: &str = r#"select * from "users" where "users"."id" = ?"#;

    #[test]
    fn test_key_is_deterministic_hex() {
        let a = compute_key("id", "get", &[], SQL, &[Value::Int(1)]).unwrap();
        let b = compute_key("id", "get", &[], SQL, &[Value::Int(1)]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_every_input_changes_key() {
        let base = compute_key("id", "get", &[], SQL, &[Value::Int(1)]).unwrap();

        let variants = [
            compute_key("result", "get", &[], SQL, &[Value::Int(1)]).unwrap(),
            compute_key("id", "first", &[], SQL, &[Value::Int(1)]).unwrap(),
            compute_key("id", "get", &[Value::from("name")], SQL, &[Value::Int(1)]).unwrap(),
            compute_key("id", "get", &[], r#"select * from "users""#, &[Value::Int(1)]).unwrap(),
            compute_key("id", "get", &[], SQL, &[Value::Int(2)]).unwrap(),
            compute_key("id", "get", &[], SQL, &[Value::from("1")]).unwrap(),
        ];

        for variant in variants {
            assert_ne!(variant, base);
        }
    }

    #[test]
    fn test_for_query_tracks_spec() {
        let spec = QuerySpec::new(&ModelDefinition::new("User", "users"));
        let filtered = spec.clone().where_compare("users.age", Operator::Gt, 21_i64);

        let a = CacheKey::for_query(StrategyKind::Id, &ReadOperation::Get, &spec).unwrap();
        let b = CacheKey::for_query(StrategyKind::Id, &ReadOperation::Get, &spec).unwrap();
        let c = CacheKey::for_query(StrategyKind::Id, &ReadOperation::Get, &filtered).unwrap();
        let d = CacheKey::for_query(StrategyKind::Result, &ReadOperation::Get, &spec).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }
}
