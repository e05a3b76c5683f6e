//! CLI commands and argument parsing

use crate::database::SourceKind;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Solidafy Extract CLI
#[derive(Parser, Debug)]
#[command(name = "solidafy-extract")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configured catalog (YAML or JSON)
    #[arg(short, long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Extraction settings (YAML or JSON)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// State file (JSON), updated after every checkpoint
    #[arg(short, long, global = true)]
    pub state: Option<PathBuf>,

    /// Inline state JSON
    #[arg(long, global = true)]
    pub state_json: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Source database to read from
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Connection string, or file path for SQLite and DuckDB
    #[arg(short, long, default_value = ":memory:")]
    pub database: String,

    /// Kind of database
    #[arg(long, value_enum, default_value_t = SourceKind::Duckdb)]
    pub source_type: SourceKind,

    /// Streams to read (comma-separated, empty = all)
    #[arg(long)]
    pub streams: Option<String>,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read records and checkpoints from the source
    Read {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Validate the catalog and settings
    Validate,

    /// Show how each stream would be partitioned, without reading it
    Plan {
        #[command(flatten)]
        source: SourceArgs,
    },
}

impl Commands {
    /// Subcommand name as typed on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Read { .. } => "read",
            Commands::Validate => "validate",
            Commands::Plan { .. } => "plan",
        }
    }
}

impl SourceArgs {
    /// Whether a stream was selected with `--streams`
    pub fn selects(&self, namespace: Option<&str>, name: &str) -> bool {
        let Some(streams) = &self.streams else {
            return true;
        };
        streams.split(',').map(str::trim).any(|selected| {
            selected == name
                || namespace.is_some_and(|ns| selected == format!("{ns}.{name}"))
        })
    }
}
