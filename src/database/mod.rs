//! Database source support via DuckDB
//!
//! DuckDB runs the generated queries, either against its own tables or
//! against a PostgreSQL, MySQL or SQLite database it attaches.

mod connection;
mod source;
pub mod sql;

pub use connection::{ConnectionConfig, SourceKind, SOURCE_CATALOG};
pub use source::DuckDbSource;
