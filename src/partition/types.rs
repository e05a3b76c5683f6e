//! Partition types
//!
//! A `Partition` is an immutable, half-open slice `(lower, upper]` of one
//! stream's rows in checkpoint-column order. Splitting and resuming create
//! new partitions; bounds are never mutated.

use crate::catalog::{Field, Stream};
use crate::error::{Error, Result};
use crate::source::SelectQuery;
use crate::state::{
    CdcSnapshotState, Checkpoint, CursorState, SnapshotState, State, StreamKey,
};
use crate::types::{JsonValue, Row};
use crate::value::CursorValue;
use std::iter;

/// Which phase a partition belongs to
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionKind {
    /// Full refresh snapshot
    Snapshot,
    /// Primary-key snapshot preceding cursor reads
    SnapshotWithCursor {
        cursor: Field,
        cursor_upper_bound: Option<CursorValue>,
    },
    /// Rows whose cursor lies in `(lower, upper]`
    CursorIncremental {
        cursor: Field,
        cursor_upper_bound: Option<CursorValue>,
    },
    /// Snapshot preceding change-log reads
    CdcSnapshot,
}

/// An immutable slice of a stream to read
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    stream: StreamKey,
    kind: PartitionKind,
    columns: Vec<Field>,
    checkpoint_columns: Vec<Field>,
    lower_bound: Option<Vec<CursorValue>>,
    upper_bound: Option<Vec<CursorValue>>,
    is_final: bool,
    splittable: bool,
    empty: bool,
}

impl Partition {
    /// Create the last (or only) partition of a phase
    ///
    /// An empty `checkpoint_columns` makes the partition non-resumable: it
    /// is read in one go and never split.
    pub fn new(
        stream: &Stream,
        kind: PartitionKind,
        checkpoint_columns: Vec<Field>,
        lower_bound: Option<Vec<CursorValue>>,
        upper_bound: Option<Vec<CursorValue>>,
    ) -> Self {
        let splittable = checkpoint_columns
            .first()
            .is_some_and(|c| c.field_type.is_splittable());
        Self {
            stream: stream.key.clone(),
            kind,
            columns: stream.fields.clone(),
            checkpoint_columns,
            lower_bound,
            upper_bound,
            is_final: true,
            splittable,
            empty: false,
        }
    }

    pub fn stream(&self) -> &StreamKey {
        &self.stream
    }

    pub fn kind(&self) -> &PartitionKind {
        &self.kind
    }

    pub fn columns(&self) -> &[Field] {
        &self.columns
    }

    pub fn checkpoint_columns(&self) -> &[Field] {
        &self.checkpoint_columns
    }

    /// Exclusive lower bound, `None` for the start of the table
    pub fn lower_bound(&self) -> Option<&[CursorValue]> {
        self.lower_bound.as_deref()
    }

    /// Inclusive upper bound, `None` for open-ended
    pub fn upper_bound(&self) -> Option<&[CursorValue]> {
        self.upper_bound.as_deref()
    }

    /// Completing this partition completes its phase
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// Marker for a table found empty; reading it is a no-op
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn is_resumable(&self) -> bool {
        !self.checkpoint_columns.is_empty()
    }

    pub fn is_splittable(&self) -> bool {
        self.splittable && !self.empty && self.is_resumable()
    }

    /// Checkpoint values never repeat across rows
    ///
    /// Only cursor partitions order by a possibly non-unique column.
    pub fn has_unique_ordering(&self) -> bool {
        !matches!(self.kind, PartitionKind::CursorIncremental { .. })
    }

    /// A copy that will not be split further
    #[must_use]
    pub fn unsplittable(&self) -> Self {
        Self {
            splittable: false,
            ..self.clone()
        }
    }

    /// Terminal marker completing the phase without reading
    #[must_use]
    pub fn as_empty(&self) -> Self {
        Self {
            empty: true,
            splittable: false,
            ..self.clone()
        }
    }

    /// The rest of this partition after the given checkpoint
    #[must_use]
    pub fn resume_from(&self, checkpoint: Vec<CursorValue>) -> Self {
        Self {
            lower_bound: Some(checkpoint),
            splittable: false,
            ..self.clone()
        }
    }

    /// Contiguous children split at strictly increasing boundaries
    ///
    /// The first child starts at this partition's lower bound, each next one
    /// at the previous one's upper bound, and the last ends at this
    /// partition's upper bound. Only the last child inherits `is_final`.
    pub fn split_at(&self, boundaries: Vec<Vec<CursorValue>>) -> Vec<Self> {
        let count = boundaries.len() + 1;
        let lowers: Vec<_> = iter::once(self.lower_bound.clone())
            .chain(boundaries.iter().cloned().map(Some))
            .collect();
        let uppers = boundaries
            .into_iter()
            .map(Some)
            .chain(iter::once(self.upper_bound.clone()));

        lowers
            .into_iter()
            .zip(uppers)
            .enumerate()
            .map(|(i, (lower_bound, upper_bound))| Self {
                lower_bound,
                upper_bound,
                is_final: self.is_final && i + 1 == count,
                splittable: false,
                ..self.clone()
            })
            .collect()
    }

    fn selected_columns(&self) -> Vec<Field> {
        let mut columns = self.columns.clone();
        for column in &self.checkpoint_columns {
            if !columns.iter().any(|c| c.name == column.name) {
                columns.push(column.clone());
            }
        }
        columns
    }

    /// Query reading this partition's rows in checkpoint order
    pub fn query(&self) -> SelectQuery {
        SelectQuery::new(self.stream.clone(), self.selected_columns())
            .with_order_by(self.checkpoint_columns.clone())
            .with_bounds(self.lower_bound.clone(), self.upper_bound.clone())
    }

    /// Query sampling this partition's rows in checkpoint order
    pub fn sampling_query(&self, rate: f64, limit: u64) -> SelectQuery {
        self.query().with_sample_rate(rate).with_limit(limit)
    }

    /// Checkpoint values of a row, `None` if any of them is null
    pub fn checkpoint_values(&self, row: &Row) -> Result<Option<Vec<CursorValue>>> {
        let mut values = Vec::with_capacity(self.checkpoint_columns.len());
        for column in &self.checkpoint_columns {
            let raw = row.get(&column.name).unwrap_or(&JsonValue::Null);
            match CursorValue::from_json(column.field_type, raw)? {
                Some(value) => values.push(value),
                None => return Ok(None),
            }
        }
        Ok(Some(values))
    }

    /// Marker state set while this partition is being read
    pub fn starting_state(&self) -> State {
        match &self.kind {
            PartitionKind::Snapshot => State::Snapshot(SnapshotState::Starting {
                upper_bound: self.upper_bound.clone(),
            }),
            PartitionKind::SnapshotWithCursor {
                cursor,
                cursor_upper_bound,
            } => State::Cursor(CursorState::SnapshotStarting {
                upper_bound: self.upper_bound.clone(),
                cursor: cursor.clone(),
                cursor_upper_bound: cursor_upper_bound.clone(),
            }),
            PartitionKind::CursorIncremental {
                cursor,
                cursor_upper_bound,
            } => State::Cursor(CursorState::Starting {
                cursor: cursor.clone(),
                lower_bound: first(self.lower_bound.as_deref()),
                upper_bound: cursor_upper_bound.clone(),
            }),
            PartitionKind::CdcSnapshot => State::CdcSnapshot(CdcSnapshotState::Starting),
        }
    }

    /// State after reading every row up to and including `last`
    pub fn incomplete_state(&self, last: Vec<CursorValue>) -> Result<State> {
        if !self.is_resumable() {
            return Err(Error::partition(
                self.stream.to_string(),
                "non-resumable partitions have no intermediate state",
            ));
        }
        let checkpoint = Checkpoint::new(self.checkpoint_columns.clone(), last);
        Ok(match &self.kind {
            PartitionKind::Snapshot => State::Snapshot(SnapshotState::Ongoing { checkpoint }),
            PartitionKind::SnapshotWithCursor {
                cursor,
                cursor_upper_bound,
            } => State::Cursor(CursorState::SnapshotOngoing {
                checkpoint,
                cursor: cursor.clone(),
                cursor_upper_bound: cursor_upper_bound.clone(),
            }),
            PartitionKind::CursorIncremental { cursor, .. } => {
                let value = checkpoint.values.into_iter().next().ok_or_else(|| {
                    Error::partition(self.stream.to_string(), "missing cursor value")
                })?;
                State::Cursor(CursorState::Ongoing {
                    cursor: cursor.clone(),
                    value,
                })
            }
            PartitionKind::CdcSnapshot => {
                State::CdcSnapshot(CdcSnapshotState::Ongoing { checkpoint })
            }
        })
    }

    /// State after reading the whole partition
    pub fn complete_state(&self) -> Result<State> {
        if !self.is_final {
            let upper = self.upper_bound.clone().ok_or_else(|| {
                Error::partition(
                    self.stream.to_string(),
                    "inner partition without upper bound",
                )
            })?;
            return self.incomplete_state(upper);
        }
        Ok(match &self.kind {
            PartitionKind::Snapshot => State::Snapshot(SnapshotState::Completed),
            PartitionKind::SnapshotWithCursor {
                cursor,
                cursor_upper_bound,
            } => State::Cursor(CursorState::Completed {
                cursor: cursor.clone(),
                value: cursor_upper_bound.clone(),
            }),
            PartitionKind::CursorIncremental {
                cursor,
                cursor_upper_bound,
            } => {
                State::Cursor(CursorState::Completed {
                    cursor: cursor.clone(),
                    value: cursor_upper_bound
                        .clone()
                        .or_else(|| first(self.lower_bound.as_deref())),
                })
            }
            PartitionKind::CdcSnapshot => State::CdcSnapshot(CdcSnapshotState::Completed),
        })
    }
}

fn first(values: Option<&[CursorValue]>) -> Option<CursorValue> {
    values.and_then(|v| v.first().cloned())
}
