//! # Repository Module
//!
//! The repository facade and the data sources it reads through.

pub mod facade;
pub mod memory_source;
pub mod traits;

pub use facade::{CallOutcome, Repository};
pub use memory_source::{ExecutedStatement, MemorySource};
pub use traits::{DataSource, SharedDataSource};
