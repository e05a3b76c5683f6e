//! Source query capability
//!
//! The extraction core never writes SQL itself. It describes reads as
//! `SelectQuery` values and hands them to a `QueryExecutor`.
//!
//! # Overview
//!
//! - `QueryExecutor` - Lazy reads, sampling, bound probes and size estimates
//! - `SelectQuery` - An ordered, half-open bounded select
//! - `MemorySource` - In-memory executor for tests and dry runs

mod executor;
mod memory;
mod query;

pub use executor::{QueryExecutor, RowStream};
pub use memory::MemorySource;
pub use query::{SelectQuery, TableSizeEstimate};
