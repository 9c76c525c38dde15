//! Persistence layer error types

use thiserror::Error;

/// Persistence layer errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A model-shaped result was cached by id but its primary key was not selected.
    #[error("The primary key is required on queries with cache")]
    PrimaryKeyRequired,

    #[error("Cache strategy not found: {0}")]
    CacheStrategyNotFound(String),

    #[error("Operator {0} is invalid")]
    InvalidOperator(String),

    #[error("Method {method} does not exist in {repository}")]
    MethodNotFound { repository: String, method: String },

    #[error("Invalid arguments for {method}: {reason}")]
    InvalidArgument { method: String, reason: String },

    #[error("You can not specify an orderBy clause when using this function")]
    CanNotSpecifyOrderByClause,

    #[error("No query results for model {model}")]
    ModelNotFound { model: String },

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PersistenceError {
    pub(crate) fn invalid_argument(method: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for PersistenceError {
    fn from(err: redis::RedisError) -> Self {
        Self::Redis(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
