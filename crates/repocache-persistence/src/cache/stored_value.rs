//! What a caching strategy actually writes to the store.

use repocache_domain::{ReadResult, Value};
use serde::{Deserialize, Serialize};

/// Tagged cache payload.
///
/// Serialized as `{"kind": "...", "value": ...}`. The variant is carried
/// as a tag, so a text result can never be confused with an id set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StoredValue {
    /// The operation produced nothing.
    Null,
    /// Primary keys of a model-shaped result, in result order.
    PrimaryKeySet(Vec<Value>),
    /// Primary keys of one page, with the page's position and total.
    PageKeys {
        ids: Vec<Value>,
        page: u64,
        per_page: u64,
        total: Option<u64>,
    },
    /// The result itself.
    Raw(ReadResult),
}

impl StoredValue {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::PrimaryKeySet(_) => "primary_key_set",
            Self::PageKeys { .. } => "page_keys",
            Self::Raw(_) => "raw",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_string(&StoredValue::PrimaryKeySet(vec![Value::Int(7), Value::Int(9)])).unwrap();
        assert_eq!(json, r#"{"kind":"primary_key_set","value":[7,9]}"#);

        let json = serde_json::to_string(&StoredValue::Null).unwrap();
        assert_eq!(json, r#"{"kind":"null"}"#);
    }

    #[test]
    fn test_page_keys_wire_format() {
        let stored = StoredValue::PageKeys { ids: vec![Value::Int(3)], page: 2, per_page: 2, total: Some(5) };
        let json = serde_json::to_string(&stored).unwrap();
        assert_eq!(json, r#"{"kind":"page_keys","value":{"ids":[3],"page":2,"per_page":2,"total":5}}"#);

        let back: StoredValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stored);
    }

    #[test]
    fn test_text_result_is_not_an_id_set() {
        let stored = StoredValue::Raw(ReadResult::Scalar(Value::from("pks:1,2")));
        let json = serde_json::to_string(&stored).unwrap();
        let back: StoredValue = serde_json::from_str(&json).unwrap();

        assert_eq!(back.kind(), "raw");
        assert_eq!(back, stored);
    }

    #[test]
    fn test_empty_and_non_empty_sets_differ() {
        let empty = serde_json::to_string(&StoredValue::PrimaryKeySet(vec![])).unwrap();
        let one = serde_json::to_string(&StoredValue::PrimaryKeySet(vec![Value::Int(1)])).unwrap();
        assert_ne!(empty, one);

        let back: StoredValue = serde_json::from_str(&empty).unwrap();
        assert_eq!(back, StoredValue::PrimaryKeySet(vec![]));
    }
}
