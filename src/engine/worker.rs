//! Partition worker
//!
//! Reads one partition, sending every row on the output channel, and stops
//! early at a safe point once its soft timeout fires.

use super::types::Message;
use crate::error::{Error, Result};
use crate::partition::Partition;
use crate::source::QueryExecutor;
use crate::state::{State, WorkResult};
use crate::value::CursorValue;
use futures::TryStreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Token cancelled after `after`, or when `parent` is
///
/// Abort the returned handle once the guarded work is done.
pub fn soft_timeout(parent: &CancellationToken, after: Duration) -> (CancellationToken, JoinHandle<()>) {
    let token = parent.child_token();
    let timer = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            token.cancel();
        })
    };
    (token, timer)
}

/// Result of reading a partition
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOutcome {
    pub result: WorkResult,
    /// Unread rest of the partition, if the read stopped early
    pub remainder: Option<Partition>,
}

/// Reads partitions into the output channel
#[derive(Clone)]
pub struct PartitionWorker {
    executor: Arc<dyn QueryExecutor>,
    output: mpsc::Sender<Message>,
}

impl PartitionWorker {
    pub fn new(executor: Arc<dyn QueryExecutor>, output: mpsc::Sender<Message>) -> Self {
        Self { executor, output }
    }

    /// Read a partition that was started from `input`
    ///
    /// `stop` is checked between batches of `fetch_size` rows. Once it is
    /// cancelled the worker finishes the current batch and, for partitions
    /// ordered by a non-unique column, every further row sharing the last
    /// checkpoint value. Non-resumable partitions are always read to the end.
    pub async fn run(
        &self,
        partition: &Partition,
        input: State,
        fetch_size: usize,
        stop: &CancellationToken,
    ) -> Result<WorkerOutcome> {
        if partition.is_empty() {
            return Ok(WorkerOutcome {
                result: WorkResult::new(input, partition.complete_state()?, 0),
                remainder: None,
            });
        }

        let resumable = partition.is_resumable();
        let unique = partition.has_unique_ordering();
        let batch = fetch_size.max(1);
        let mut rows = self.executor.read(partition.query(), fetch_size);

        let mut record_count = 0u64;
        let mut since_check = 0usize;
        let mut stopping = false;
        let mut interrupted = false;
        let mut last: Option<Vec<CursorValue>> = None;

        while let Some(row) = rows.try_next().await? {
            let values = if resumable {
                partition.checkpoint_values(&row)?
            } else {
                None
            };
            if resumable && since_check >= batch {
                since_check = 0;
                stopping = stopping || stop.is_cancelled();
            }
            if stopping && last.is_some() && (unique || values != last) {
                interrupted = true;
                break;
            }
            since_check += 1;
            if values.is_some() {
                last = values;
            }

            self.output
                .send(Message::record(partition.stream().clone(), row))
                .await
                .map_err(|_| Error::output("output channel closed"))?;
            record_count += 1;
        }

        let (output, remainder) = match last {
            Some(last) if interrupted => {
                debug!(
                    stream = %partition.stream(),
                    records = record_count,
                    checkpoint = ?last,
                    "Partition read stopped early"
                );
                (
                    partition.incomplete_state(last.clone())?,
                    Some(partition.resume_from(last)),
                )
            }
            _ => (partition.complete_state()?, None),
        };
        Ok(WorkerOutcome {
            result: WorkResult::new(input, output, record_count),
            remainder,
        })
    }
}
