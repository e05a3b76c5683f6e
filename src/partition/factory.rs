//! Partition factory
//!
//! Maps a stream's current state to the next partition to read. Upper
//! bounds are probed at most once per stream per run, so every partition
//! of a run reads against the same snapshot boundary.

use super::types::{Partition, PartitionKind};
use crate::catalog::{Field, Stream};
use crate::error::{Error, Result};
use crate::source::QueryExecutor;
use crate::state::{CdcSnapshotState, CursorState, SnapshotState, State, StreamKey};
use crate::value::{compare_tuples, CursorValue};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct Probes {
    primary_key_upper: Option<Option<Vec<CursorValue>>>,
    cursor_upper: Option<Option<CursorValue>>,
}

/// Builds partitions from states
pub struct PartitionFactory {
    executor: Arc<dyn QueryExecutor>,
    probes: Mutex<HashMap<StreamKey, Probes>>,
}

impl PartitionFactory {
    /// Create a new factory
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            executor,
            probes: Mutex::new(HashMap::new()),
        }
    }

    /// Next partition for a stream, `None` exactly when its state is Completed
    pub async fn create(&self, stream: &Stream, state: &State) -> Result<Option<Partition>> {
        let partition = match state {
            State::Snapshot(snapshot) => match snapshot {
                SnapshotState::NotStarted => self.cold_snapshot(stream).await?,
                SnapshotState::Starting { upper_bound } => Partition::new(
                    stream,
                    PartitionKind::Snapshot,
                    stream.primary_key.clone(),
                    None,
                    upper_bound.clone(),
                ),
                SnapshotState::Ongoing { checkpoint } => Partition::new(
                    stream,
                    PartitionKind::Snapshot,
                    stream.primary_key.clone(),
                    Some(checkpoint.values.clone()),
                    self.primary_key_upper(stream).await?,
                ),
                SnapshotState::Completed => return Ok(None),
            },
            State::Cursor(cursor_state) => match cursor_state {
                CursorState::NotStarted => self.cold_cursor_snapshot(stream).await?,
                CursorState::SnapshotStarting {
                    upper_bound,
                    cursor,
                    cursor_upper_bound,
                } => Partition::new(
                    stream,
                    PartitionKind::SnapshotWithCursor {
                        cursor: cursor.clone(),
                        cursor_upper_bound: cursor_upper_bound.clone(),
                    },
                    stream.primary_key.clone(),
                    None,
                    upper_bound.clone(),
                ),
                CursorState::SnapshotOngoing {
                    checkpoint,
                    cursor,
                    cursor_upper_bound,
                } => Partition::new(
                    stream,
                    PartitionKind::SnapshotWithCursor {
                        cursor: cursor.clone(),
                        cursor_upper_bound: cursor_upper_bound.clone(),
                    },
                    stream.primary_key.clone(),
                    Some(checkpoint.values.clone()),
                    self.primary_key_upper(stream).await?,
                ),
                CursorState::Starting {
                    cursor,
                    lower_bound,
                    upper_bound,
                } => cursor_partition(stream, cursor, lower_bound.clone(), upper_bound.clone()),
                CursorState::Ongoing { cursor, value } => {
                    let probed = self.cursor_upper(stream, cursor).await?;
                    // Never move the cursor backwards, even if rows were deleted
                    let upper = match probed {
                        Some(upper) if upper.partial_cmp(value) == Some(Ordering::Greater) => {
                            upper
                        }
                        _ => value.clone(),
                    };
                    cursor_partition(stream, cursor, Some(value.clone()), Some(upper))
                }
                CursorState::Completed { .. } => return Ok(None),
            },
            State::CdcSnapshot(cdc) => match cdc {
                CdcSnapshotState::NotStarted | CdcSnapshotState::Starting => Partition::new(
                    stream,
                    PartitionKind::CdcSnapshot,
                    stream.primary_key.clone(),
                    None,
                    None,
                ),
                CdcSnapshotState::Ongoing { checkpoint } => Partition::new(
                    stream,
                    PartitionKind::CdcSnapshot,
                    stream.primary_key.clone(),
                    Some(checkpoint.values.clone()),
                    None,
                ),
                CdcSnapshotState::Completed => return Ok(None),
            },
            State::CdcLog(_) => {
                return Err(Error::partition(
                    stream.key.to_string(),
                    "change-log state is not read through partitions",
                ))
            }
        };

        debug!(
            stream = %stream.key,
            kind = ?partition.kind(),
            lower = ?partition.lower_bound(),
            upper = ?partition.upper_bound(),
            "Created partition"
        );
        Ok(Some(partition))
    }

    /// Split a partition at sampled boundaries
    ///
    /// Returns the partition itself when it cannot be split. Without
    /// boundaries the partition stays resumable and is only marked unsplittable.
    pub fn split(&self, partition: &Partition, boundaries: Vec<Vec<CursorValue>>) -> Vec<Partition> {
        if !partition.is_splittable() || boundaries.is_empty() {
            return vec![partition.unsplittable()];
        }
        partition.split_at(boundaries)
    }

    async fn cold_snapshot(&self, stream: &Stream) -> Result<Partition> {
        let upper = if stream.has_primary_key() {
            self.primary_key_upper(stream).await?
        } else {
            None
        };
        Ok(Partition::new(
            stream,
            PartitionKind::Snapshot,
            stream.primary_key.clone(),
            None,
            upper,
        ))
    }

    async fn cold_cursor_snapshot(&self, stream: &Stream) -> Result<Partition> {
        let cursor = stream.cursor.as_ref().ok_or_else(|| {
            Error::partition(stream.key.to_string(), "incremental stream has no cursor")
        })?;
        let cursor_upper_bound = self.cursor_upper(stream, cursor).await?;
        let upper = if stream.has_primary_key() {
            self.primary_key_upper(stream).await?
        } else {
            None
        };
        Ok(Partition::new(
            stream,
            PartitionKind::SnapshotWithCursor {
                cursor: cursor.clone(),
                cursor_upper_bound,
            },
            stream.primary_key.clone(),
            None,
            upper,
        ))
    }

    async fn primary_key_upper(&self, stream: &Stream) -> Result<Option<Vec<CursorValue>>> {
        if let Some(cached) = self.cached(&stream.key, |p| p.primary_key_upper.clone()) {
            return Ok(cached);
        }
        let probed = self
            .executor
            .upper_bound(&stream.key, &stream.primary_key)
            .await?;
        let mut probes = self.probes.lock();
        let entry = probes.entry(stream.key.clone()).or_default();
        Ok(entry.primary_key_upper.get_or_insert(probed).clone())
    }

    async fn cursor_upper(&self, stream: &Stream, cursor: &Field) -> Result<Option<CursorValue>> {
        if let Some(cached) = self.cached(&stream.key, |p| p.cursor_upper.clone()) {
            return Ok(cached);
        }
        let probed = self
            .executor
            .upper_bound(&stream.key, std::slice::from_ref(cursor))
            .await?
            .and_then(|values| values.into_iter().next());
        let mut probes = self.probes.lock();
        let entry = probes.entry(stream.key.clone()).or_default();
        Ok(entry.cursor_upper.get_or_insert(probed).clone())
    }

    fn cached<T>(&self, stream: &StreamKey, get: impl FnOnce(&Probes) -> Option<T>) -> Option<T> {
        self.probes.lock().get(stream).and_then(get)
    }
}

fn cursor_partition(
    stream: &Stream,
    cursor: &Field,
    lower: Option<CursorValue>,
    upper: Option<CursorValue>,
) -> Partition {
    let lower = lower.map(|v| vec![v]);
    let upper_tuple = upper.clone().map(|v| vec![v]);
    let empty_range = match (&lower, &upper_tuple) {
        (Some(l), Some(u)) => compare_tuples(l, u) != Some(Ordering::Less),
        _ => false,
    };
    let partition = Partition::new(
        stream,
        PartitionKind::CursorIncremental {
            cursor: cursor.clone(),
            cursor_upper_bound: upper,
        },
        vec![cursor.clone()],
        lower,
        upper_tuple,
    );
    if empty_range {
        partition.unsplittable()
    } else {
        partition
    }
}
