//! CLI module
//!
//! Command-line interface for running extractions.
//!
//! # Commands
//!
//! - `read` - Extract records and checkpoints from the source
//! - `validate` - Check the catalog and settings
//! - `plan` - Show the partitions each stream would be read in

mod commands;
mod runner;

pub use commands::{Cli, Commands, SourceArgs};
pub use runner::Runner;
