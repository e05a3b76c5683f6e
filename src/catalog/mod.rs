//! Catalog module
//!
//! Resolved stream definitions consumed by the extraction core.
//!
//! # Overview
//!
//! - `Catalog` - The configured streams, loaded from YAML or JSON
//! - `Stream` - A validated stream with its chosen primary key and cursor
//! - `Exclusion` - A stream left out of the sync, and why

mod resolver;
mod types;

pub use types::{Catalog, ConfiguredStream, Exclusion, Field, FieldType, Stream};

#[cfg(test)]
mod tests;
