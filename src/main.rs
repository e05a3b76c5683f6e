//! Solidafy Extract CLI
//!
//! Command-line interface for running extractions

use anyhow::Context;
use clap::Parser;
use solidafy_extract::cli::{Cli, Runner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout carries the messages, so logs go to stderr
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let command = cli.command.name();
    Runner::new(cli)
        .run()
        .await
        .with_context(|| format!("{command} failed"))
}
