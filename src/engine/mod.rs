//! Execution engine module
//!
//! Main read loop and key orchestration.
//!
//! # Overview
//!
//! The engine module provides:
//! - `SyncEngine` - Runs one task per key and checkpoints their progress
//! - `PartitionWorker` - Reads one partition under a soft timeout
//! - Message types for output (Record, State, Log)

mod types;
mod worker;

pub use types::{Message, SyncStats};
pub use worker::{soft_timeout, PartitionWorker, WorkerOutcome};

use crate::catalog::Stream;
use crate::cdc::{CdcFeed, CdcTarget};
use crate::config::ExtractConfig;
use crate::error::{Error, Result};
use crate::partition::{AdaptiveSplitter, Partition, PartitionFactory, SplitterConfig};
use crate::source::QueryExecutor;
use crate::state::{
    CdcLogState, GlobalKey, Key, PersistedState, State, StateFamily,
    StateManager, WorkResult,
};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Sync engine for orchestrating extraction
pub struct SyncEngine {
    executor: Arc<dyn QueryExecutor>,
    config: ExtractConfig,
    streams: Vec<Stream>,
    cdc: Option<Arc<dyn CdcFeed>>,
    shutdown: CancellationToken,
}

/// Everything a key's task shares with the others
struct ReadContext {
    manager: StateManager,
    factory: PartitionFactory,
    splitter: AdaptiveSplitter,
    worker: PartitionWorker,
    output: mpsc::Sender<Message>,
    /// Held from taking checkpoints until they are sent, keeping each key's
    /// checkpoints in commit order
    emission: Mutex<()>,
    config: ExtractConfig,
    shutdown: CancellationToken,
}

impl SyncEngine {
    /// Create a new sync engine
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        config: ExtractConfig,
        streams: Vec<Stream>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            executor,
            config,
            streams,
            cdc: None,
            shutdown: CancellationToken::new(),
        })
    }

    /// Read CDC streams through a change-log feed
    #[must_use]
    pub fn with_cdc(mut self, feed: Arc<dyn CdcFeed>) -> Self {
        self.cdc = Some(feed);
        self
    }

    /// Token that stops every key at its next safe point
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    /// Read every stream, resuming from `persisted`
    ///
    /// Records and checkpoints go to `output` in order: a checkpoint always
    /// follows the records it covers. A failing key is reported in the
    /// returned stats without stopping the others.
    pub async fn read(
        &self,
        persisted: &PersistedState,
        output: mpsc::Sender<Message>,
    ) -> Result<SyncStats> {
        let start = Instant::now();
        let replication = self.config.replication;
        let global = self.global_key()?;

        let mut initial = Vec::with_capacity(self.streams.len() + 1);
        let mut reset = false;
        if let (Some(global), Some(feed)) = (&global, &self.cdc) {
            let bootstrap = feed.bootstrap(persisted.shared_state()).await?;
            if let Some(notice) = bootstrap.reset {
                send(&output, Message::warn(notice)).await?;
                reset = true;
            }
            initial.push((Key::Global(global.clone()), State::CdcLog(bootstrap.state)));
        }
        for stream in &self.streams {
            let nested = global.as_ref().is_some_and(|g| g.contains(&stream.key));
            let saved = if reset && nested {
                None
            } else {
                persisted.stream_state(&stream.key)
            };
            let state = State::restore(stream, replication, saved)?;
            debug!(stream = %stream.key, state = ?state, "Restored state");
            initial.push((Key::Stream(stream.key.clone()), state));
        }

        let ctx = Arc::new(ReadContext {
            manager: StateManager::new(initial)?,
            factory: PartitionFactory::new(self.executor.clone()),
            splitter: AdaptiveSplitter::new(
                self.executor.clone(),
                SplitterConfig::from(&self.config),
            ),
            worker: PartitionWorker::new(self.executor.clone(), output.clone()),
            output: output.clone(),
            emission: Mutex::new(()),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
        });

        info!(
            streams = self.streams.len(),
            cdc = global.is_some(),
            max_concurrency = self.config.max_concurrency,
            "Starting sync"
        );

        let permits = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut tasks = JoinSet::new();
        if let (Some(global), Some(feed)) = (global, self.cdc.clone()) {
            let (ctx, permits) = (ctx.clone(), permits.clone());
            tasks.spawn(async move {
                let name = global.to_string();
                let _permit = permits.acquire_owned().await;
                (name, read_change_log(ctx, global, feed).await)
            });
        }
        for stream in self.streams.clone() {
            let (ctx, permits) = (ctx.clone(), permits.clone());
            tasks.spawn(async move {
                let name = stream.key.to_string();
                let _permit = permits.acquire_owned().await;
                (name, read_stream(ctx, stream).await)
            });
        }

        let mut stats = SyncStats::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(key_stats))) => stats.merge(key_stats),
                Ok((key, Err(e))) => {
                    error!(key = %key, error = %e, "Key failed");
                    send(&output, Message::error(format!("{key} failed: {e}"))).await?;
                    stats.add_failure(key, e.to_string());
                }
                Err(e) => {
                    error!(error = %e, "Key task panicked");
                    stats.add_failure("unknown", e.to_string());
                }
            }
        }

        stats.checkpoints_emitted += flush(&ctx).await?;
        #[allow(clippy::cast_possible_truncation)]
        stats.set_duration(start.elapsed().as_millis() as u64);
        info!(
            records = stats.records_synced,
            checkpoints = stats.checkpoints_emitted,
            failures = stats.failures.len(),
            duration_ms = stats.duration_ms,
            "Sync finished"
        );
        Ok(stats)
    }

    /// Global key over the streams replicated through the change log
    fn global_key(&self) -> Result<Option<GlobalKey>> {
        let cdc_streams: Vec<_> = self
            .streams
            .iter()
            .filter(|s| {
                StateFamily::for_stream(s.sync_mode, self.config.replication)
                    == StateFamily::CdcSnapshot
            })
            .map(|s| s.key.clone())
            .collect();
        if cdc_streams.is_empty() {
            return Ok(None);
        }
        let Some(feed) = &self.cdc else {
            return Err(Error::config(
                "CDC replication requires a change-log reader",
            ));
        };

        let expected: HashSet<_> = cdc_streams.iter().collect();
        let covered: HashSet<_> = feed.streams().streams().collect();
        if expected != covered {
            return Err(Error::config(format!(
                "change-log feed covers {}, but CDC streams are {}",
                feed.streams(),
                GlobalKey::new(cdc_streams)
            )));
        }
        Ok(Some(feed.streams().clone()))
    }
}

async fn send(output: &mpsc::Sender<Message>, message: Message) -> Result<()> {
    output
        .send(message)
        .await
        .map_err(|_| Error::output("output channel closed"))
}

/// Commit pending progress and send the resulting checkpoints
async fn flush(ctx: &ReadContext) -> Result<u64> {
    let _emission = ctx.emission.lock().await;
    let mut emitted = 0;
    for checkpoint in ctx.manager.checkpoint() {
        send(&ctx.output, Message::State(checkpoint)).await?;
        emitted += 1;
    }
    Ok(emitted)
}

/// Read one stream's partitions in order until its state completes
async fn read_stream(ctx: Arc<ReadContext>, stream: Stream) -> Result<SyncStats> {
    let key = Key::Stream(stream.key.clone());
    let mut stats = SyncStats::new();
    let mut queue: VecDeque<Partition> = VecDeque::new();
    let mut fetch_size = ctx.config.default_fetch_size;

    loop {
        if ctx.shutdown.is_cancelled() {
            warn!(stream = %stream.key, "Shutdown requested, leaving stream incomplete");
            return Ok(stats);
        }
        let partition = match queue.pop_front() {
            Some(partition) => partition,
            None => {
                let state = ctx.manager.latest(&key)?;
                let Some(partition) = ctx.factory.create(&stream, &state).await? else {
                    break;
                };
                if !partition.is_splittable() {
                    partition
                } else {
                    let plan = ctx.splitter.plan(&ctx.factory, partition).await?;
                    fetch_size = plan.fetch_size;
                    queue.extend(plan.partitions);
                    continue;
                }
            }
        };

        let input = partition.starting_state();
        ctx.manager.set(&key, input.clone(), 0)?;
        let (stop, timer) = soft_timeout(&ctx.shutdown, ctx.config.work_timeout());
        let outcome = ctx.worker.run(&partition, input, fetch_size, &stop).await;
        timer.abort();
        let outcome = outcome?;

        ctx.manager.apply(&key, &outcome.result)?;
        stats.records_synced += outcome.result.record_count;
        stats.partitions_read += 1;
        stats.checkpoints_emitted += flush(&ctx).await?;

        if let Some(remainder) = outcome.remainder {
            queue.push_front(remainder);
        }
    }

    debug!(stream = %stream.key, records = stats.records_synced, "Stream complete");
    stats.keys_completed += 1;
    Ok(stats)
}

/// Read the change log up to the position it had when this task started
async fn read_change_log(
    ctx: Arc<ReadContext>,
    global: GlobalKey,
    feed: Arc<dyn CdcFeed>,
) -> Result<SyncStats> {
    let key = Key::Global(global.clone());
    let mut stats = SyncStats::new();
    let mut target: Option<CdcTarget> = None;

    loop {
        if ctx.shutdown.is_cancelled() {
            return Ok(stats);
        }
        let from = match ctx.manager.latest(&key)? {
            State::CdcLog(CdcLogState::Ongoing { offset }) => offset,
            State::CdcLog(CdcLogState::Completed { .. }) => break,
            other => {
                return Err(Error::state(format!(
                    "cannot read the change log from {other:?}"
                )))
            }
        };
        let target = match &target {
            Some(target) => target.clone(),
            None => target.insert(feed.target().await?).clone(),
        };

        let input = State::CdcLog(CdcLogState::Starting {
            target: target.position.clone(),
        });
        ctx.manager.set(&key, input.clone(), 0)?;
        let (stop, timer) = soft_timeout(&ctx.shutdown, ctx.config.work_timeout());
        let run = feed
            .run(&from, &target, &ctx.output, &stop, ctx.config.default_fetch_size)
            .await;
        timer.abort();
        let run = run?;

        let records: u64 = run.stream_counts.values().sum();
        let result = WorkResult::new(input, State::CdcLog(run.state), 0);
        ctx.manager.apply_global(&global, &result, &run.stream_counts)?;
        stats.records_synced += records;
        stats.partitions_read += 1;
        stats.checkpoints_emitted += flush(&ctx).await?;
    }

    stats.keys_completed += 1;
    Ok(stats)
}

#[cfg(test)]
mod tests;
