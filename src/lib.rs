// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]

//! # Solidafy Extract
//!
//! Resumable extraction core for database source connectors: full snapshots,
//! cursor-incremental reads and change-data-capture, with checkpoints that
//! never skip or lose a row across restarts.
//!
//! ## Features
//!
//! - **Per-stream state machines**: Snapshot, cursor and CDC progress as closed enums
//! - **Checkpoint coordination**: Deduplicated checkpoints, with one composite
//!   checkpoint for every stream sharing the change log
//! - **Adaptive splitting**: Large tables are sampled and cut into partitions
//!   of a target size
//! - **Soft timeouts**: Long reads stop at a safe point and resume later
//! - **CDC offset validation**: Saved log positions are checked against what
//!   the server still retains
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use solidafy_extract::{Catalog, DuckDbSource, ExtractConfig, PersistedState, SyncEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> solidafy_extract::Result<()> {
//!     let config = ExtractConfig::default();
//!     let (streams, _excluded) = Catalog::from_file("catalog.yaml")?.resolve(config.replication);
//!     let source = Arc::new(DuckDbSource::in_memory()?);
//!     let engine = SyncEngine::new(source, config, streams)?;
//!
//!     let (tx, mut rx) = tokio::sync::mpsc::channel(1024);
//!     let printer = tokio::spawn(async move {
//!         while let Some(message) = rx.recv().await {
//!             println!("{}", message.to_json());
//!         }
//!     });
//!     engine.read(&PersistedState::new(), tx).await?;
//!     printer.await.ok();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           SyncEngine                            │
//! │      one task per key  ·  soft timeouts  ·  failure isolation   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌───────────┬──────────────────┼─────────────────┬───────────────┐
//! │   State   │    Partition     │     Source      │      CDC      │
//! ├───────────┼──────────────────┼─────────────────┼───────────────┤
//! │ Machines  │ Factory          │ QueryExecutor   │ Positions     │
//! │ Manager   │ Splitter         │ DuckDB          │ Validator     │
//! │ Store     │                  │ Memory          │ Log feed      │
//! └───────────┴──────────────────┴─────────────────┴───────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Extraction settings
pub mod config;

/// Configured streams and their validation
pub mod catalog;

/// Typed checkpoint values
pub mod value;

/// State machines, checkpoint coordination and persistence
pub mod state;

/// Query descriptions and executors
pub mod source;

/// Partition creation and adaptive splitting
pub mod partition;

/// Change data capture
pub mod cdc;

/// Main execution engine
pub mod engine;

/// Database source support via DuckDB
pub mod database;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use catalog::{Catalog, ConfiguredStream, Field, FieldType, Stream};
pub use config::ExtractConfig;
pub use database::DuckDbSource;
pub use engine::{Message, SyncEngine, SyncStats};
pub use error::{Error, Result};
pub use state::{PersistedState, StateStore};
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
