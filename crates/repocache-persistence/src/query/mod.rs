//! # Query Module
//!
//! Pending query state, its SQL compilation and the operation enumeration.

pub mod operation;
pub mod predicate;
pub mod spec;

pub use operation::{BuilderOperation, Operation, ReadOperation, DEFAULT_LATEST_COLUMN, DEFAULT_PER_PAGE};
pub use predicate::{quote_identifier, Direction, KeyFilter, Operator, Order, Predicate};
pub use spec::QuerySpec;
