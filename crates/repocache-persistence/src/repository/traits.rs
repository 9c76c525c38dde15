//! # Data Source Trait
//!
//! Abstract query executor behind the repository facade.
//! Implementations can be swapped for different backends (in-memory, SQL, mock, etc.)

use std::sync::Arc;

use async_trait::async_trait;
use repocache_domain::ReadResult;

use crate::error::Result;
use crate::query::{QuerySpec, ReadOperation};

/// Executes a read operation against a query specification.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Run `operation` on the rows `spec` describes
    async fn execute(&self, spec: &QuerySpec, operation: &ReadOperation) -> Result<ReadResult>;
}

/// Data source shared between repositories
pub type SharedDataSource = Arc<dyn DataSource>;
