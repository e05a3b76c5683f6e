//! CLI runner - executes commands

use crate::catalog::{Catalog, Exclusion, Stream};
use crate::cli::commands::{Cli, Commands, SourceArgs};
use crate::config::ExtractConfig;
use crate::database::{ConnectionConfig, DuckDbSource};
use crate::engine::{Message, SyncEngine, SyncStats};
use crate::error::{Error, Result, ResultExt};
use crate::partition::{AdaptiveSplitter, PartitionFactory, SplitterConfig};
use crate::source::QueryExecutor;
use crate::state::{State, StateFamily, StateStore};
use crate::value::CursorValue;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Read { source } => {
                let stats = self.read(source).await?;
                if stats.is_success() {
                    Ok(())
                } else {
                    Err(Error::Other(format!(
                        "{} of the sync's keys failed",
                        stats.failures.len()
                    )))
                }
            }
            Commands::Validate => self.validate(),
            Commands::Plan { source } => self.plan(source).await,
        }
    }

    /// Load extraction settings, falling back to the defaults
    fn load_config(&self) -> Result<ExtractConfig> {
        match &self.cli.config {
            Some(path) => ExtractConfig::from_file(path),
            None => Ok(ExtractConfig::default()),
        }
    }

    fn load_catalog(&self) -> Result<Catalog> {
        let path = self
            .cli
            .catalog
            .as_ref()
            .ok_or_else(|| Error::config("Catalog file not specified (use -c flag)"))?;
        Catalog::from_file(path).with_context(|| format!("Loading catalog {}", path.display()))
    }

    /// Load state from file or inline JSON
    fn load_state(&self) -> Result<StateStore> {
        if let Some(json) = &self.cli.state_json {
            return StateStore::from_json(json);
        }
        match &self.cli.state {
            Some(path) => StateStore::from_file(path),
            None => Ok(StateStore::in_memory()),
        }
    }

    /// Resolve the catalog, keeping the streams selected on the command line
    fn resolve(
        &self,
        config: &ExtractConfig,
        source: Option<&SourceArgs>,
    ) -> Result<(Vec<Stream>, Vec<Exclusion>)> {
        let catalog = self.load_catalog()?;
        let (mut streams, excluded) = catalog.resolve(config.replication);
        if let Some(source) = source {
            streams.retain(|s| source.selects(s.key.namespace.as_deref(), &s.key.name));
        }
        Ok((streams, excluded))
    }

    fn connect(source: &SourceArgs) -> Result<Arc<DuckDbSource>> {
        let connection = ConnectionConfig::new(source.source_type, source.database.clone());
        let db = DuckDbSource::connect(connection)?;
        db.check_connection()?;
        Ok(Arc::new(db))
    }

    /// Read every selected stream, printing messages as JSON lines
    async fn read(&self, source: &SourceArgs) -> Result<SyncStats> {
        let config = self.load_config()?;
        let (streams, excluded) = self.resolve(&config, Some(source))?;
        let store = self.load_state()?;

        for exclusion in &excluded {
            print_message(&Message::warn(format!(
                "Stream '{}' excluded: {}",
                exclusion.stream, exclusion.reason
            )));
        }
        if streams.is_empty() {
            return Err(Error::config("No streams to read"));
        }

        let executor = Self::connect(source)?;
        let engine = SyncEngine::new(executor, config, streams)?;

        let shutdown = engine.shutdown_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping at the next checkpoint");
                shutdown.cancel();
            }
        });

        let persisted = store.snapshot().await;
        let (tx, mut rx) = mpsc::channel(1024);
        let consume = async {
            while let Some(message) = rx.recv().await {
                print_message(&message);
                if let Message::State(checkpoint) = &message {
                    store.apply(checkpoint).await?;
                }
            }
            Ok::<_, Error>(())
        };

        let (stats, consumed) = tokio::join!(engine.read(&persisted, tx), consume);
        consumed?;
        let stats = stats?;

        info!(
            records = stats.records_synced,
            checkpoints = stats.checkpoints_emitted,
            failures = stats.failures.len(),
            duration_ms = stats.duration_ms,
            "Read complete"
        );
        Ok(stats)
    }

    /// Check the catalog and settings without touching the source
    fn validate(&self) -> Result<()> {
        let config = self.load_config()?;
        config.validate()?;
        let (streams, excluded) = self.resolve(&config, None)?;

        let streams: Vec<Value> = streams
            .iter()
            .map(|s| {
                json!({
                    "stream": s.key.to_string(),
                    "sync_mode": s.sync_mode,
                    "state": format!(
                        "{:?}",
                        StateFamily::for_stream(s.sync_mode, config.replication)
                    ),
                    "primary_key": s.primary_key.iter().map(|f| &f.name).collect::<Vec<_>>(),
                    "cursor": s.cursor.as_ref().map(|f| &f.name),
                })
            })
            .collect();
        let excluded: Vec<Value> = excluded
            .iter()
            .map(|e| json!({"stream": e.stream.to_string(), "reason": e.reason}))
            .collect();

        println!(
            "{}",
            json!({
                "type": "VALIDATION",
                "valid": excluded.is_empty(),
                "streams": streams,
                "excluded": excluded,
            })
        );
        Ok(())
    }

    /// Print the partitions each stream would be read in
    async fn plan(&self, source: &SourceArgs) -> Result<()> {
        let config = self.load_config()?;
        let (streams, _) = self.resolve(&config, Some(source))?;
        let store = self.load_state()?;
        let persisted = store.snapshot().await;

        let executor: Arc<dyn QueryExecutor> = Self::connect(source)?;
        let factory = PartitionFactory::new(executor.clone());
        let splitter = AdaptiveSplitter::new(executor, SplitterConfig::from(&config));

        for stream in &streams {
            let saved = persisted.stream_state(&stream.key);
            let state = State::restore(stream, config.replication, saved)?;
            let Some(partition) = factory.create(stream, &state).await? else {
                println!("{}", json!({"stream": stream.key.to_string(), "partitions": []}));
                continue;
            };

            let (partitions, fetch_size) = if partition.is_splittable() {
                let plan = splitter.plan(&factory, partition).await?;
                (plan.partitions, plan.fetch_size)
            } else {
                (vec![partition], config.default_fetch_size)
            };
            let partitions: Vec<Value> = partitions
                .iter()
                .map(|p| {
                    json!({
                        "lower": p.lower_bound().map(bound),
                        "upper": p.upper_bound().map(bound),
                        "resumable": p.is_resumable(),
                    })
                })
                .collect();
            println!(
                "{}",
                json!({
                    "stream": stream.key.to_string(),
                    "fetch_size": fetch_size,
                    "partitions": partitions,
                })
            );
        }
        Ok(())
    }
}

fn bound(values: &[CursorValue]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

/// Print a message as one JSON line
fn print_message(message: &Message) {
    println!("{}", message.to_json());
}
