//! State types for tracking sync progress
//!
//! `State` is the in-memory progress of one key. Only its Ongoing and
//! Completed variants are persisted, as a `StateValue`.

use super::key::StreamKey;
use crate::catalog::{Field, Stream};
use crate::error::{Error, Result};
use crate::types::{OpaqueStateValue, ReplicationMethod, SyncMode};
use crate::value::CursorValue;
use serde::{Deserialize, Serialize};
use tracing::warn;

// ============================================================================
// Checkpoint
// ============================================================================

/// Checkpoint-column values of the last fully processed row
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub columns: Vec<Field>,
    pub values: Vec<CursorValue>,
}

impl Checkpoint {
    /// Create a new checkpoint
    pub fn new(columns: Vec<Field>, values: Vec<CursorValue>) -> Self {
        Self { columns, values }
    }

    fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    fn encoded_values(&self) -> Vec<String> {
        self.values.iter().map(ToString::to_string).collect()
    }

    /// Decode persisted values against the configured columns
    ///
    /// Returns `None` if the persisted column names no longer match.
    fn decode(columns: &[Field], names: &[String], values: &[String]) -> Result<Option<Self>> {
        let matches = columns.len() == names.len()
            && columns.iter().zip(names).all(|(c, n)| &c.name == n);
        if !matches {
            return Ok(None);
        }
        if values.len() != columns.len() {
            return Err(Error::state(format!(
                "checkpoint has {} values for {} columns",
                values.len(),
                columns.len()
            )));
        }
        let values = columns
            .iter()
            .zip(values)
            .map(|(c, v)| CursorValue::parse(c.field_type, v))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(Self::new(columns.to_vec(), values)))
    }
}

// ============================================================================
// State families
// ============================================================================

/// Full snapshot progress
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotState {
    NotStarted,
    Starting {
        upper_bound: Option<Vec<CursorValue>>,
    },
    Ongoing {
        checkpoint: Checkpoint,
    },
    Completed,
}

/// Cursor-incremental progress: a primary-key snapshot, then cursor reads
#[derive(Debug, Clone, PartialEq)]
pub enum CursorState {
    NotStarted,
    SnapshotStarting {
        upper_bound: Option<Vec<CursorValue>>,
        cursor: Field,
        cursor_upper_bound: Option<CursorValue>,
    },
    /// The cursor upper bound is the cursor checkpoint once the snapshot ends
    SnapshotOngoing {
        checkpoint: Checkpoint,
        cursor: Field,
        cursor_upper_bound: Option<CursorValue>,
    },
    Starting {
        cursor: Field,
        lower_bound: Option<CursorValue>,
        upper_bound: Option<CursorValue>,
    },
    Ongoing {
        cursor: Field,
        value: CursorValue,
    },
    Completed {
        cursor: Field,
        value: Option<CursorValue>,
    },
}

/// Bounded snapshot preceding log-based reads
#[derive(Debug, Clone, PartialEq)]
pub enum CdcSnapshotState {
    NotStarted,
    Starting,
    Ongoing { checkpoint: Checkpoint },
    Completed,
}

/// Change-log progress of a global key
#[derive(Debug, Clone, PartialEq)]
pub enum CdcLogState {
    NotStarted,
    Starting { target: String },
    Ongoing { offset: OpaqueStateValue },
    Completed { offset: OpaqueStateValue },
}

/// Which state family a key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFamily {
    Snapshot,
    Cursor,
    CdcSnapshot,
    CdcLog,
}

impl StateFamily {
    /// Family used for a stream given its sync mode and replication method
    pub fn for_stream(sync_mode: SyncMode, replication: ReplicationMethod) -> Self {
        match (sync_mode, replication) {
            (SyncMode::FullRefresh, _) => StateFamily::Snapshot,
            (SyncMode::Incremental, ReplicationMethod::Standard) => StateFamily::Cursor,
            (SyncMode::Incremental, ReplicationMethod::Cdc) => StateFamily::CdcSnapshot,
        }
    }
}

/// Progress of one key
#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Snapshot(SnapshotState),
    Cursor(CursorState),
    CdcSnapshot(CdcSnapshotState),
    CdcLog(CdcLogState),
}

impl State {
    /// Initial state of a family
    pub fn not_started(family: StateFamily) -> Self {
        match family {
            StateFamily::Snapshot => State::Snapshot(SnapshotState::NotStarted),
            StateFamily::Cursor => State::Cursor(CursorState::NotStarted),
            StateFamily::CdcSnapshot => State::CdcSnapshot(CdcSnapshotState::NotStarted),
            StateFamily::CdcLog => State::CdcLog(CdcLogState::NotStarted),
        }
    }

    pub fn family(&self) -> StateFamily {
        match self {
            State::Snapshot(_) => StateFamily::Snapshot,
            State::Cursor(_) => StateFamily::Cursor,
            State::CdcSnapshot(_) => StateFamily::CdcSnapshot,
            State::CdcLog(_) => StateFamily::CdcLog,
        }
    }

    /// Only Ongoing and Completed states are ever persisted
    pub fn is_serializable(&self) -> bool {
        match self {
            State::Snapshot(s) => matches!(
                s,
                SnapshotState::Ongoing { .. } | SnapshotState::Completed
            ),
            State::Cursor(s) => matches!(
                s,
                CursorState::SnapshotOngoing { .. }
                    | CursorState::Ongoing { .. }
                    | CursorState::Completed { .. }
            ),
            State::CdcSnapshot(s) => matches!(
                s,
                CdcSnapshotState::Ongoing { .. } | CdcSnapshotState::Completed
            ),
            State::CdcLog(s) => matches!(
                s,
                CdcLogState::Ongoing { .. } | CdcLogState::Completed { .. }
            ),
        }
    }

    /// Completed states never produce another partition
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            State::Snapshot(SnapshotState::Completed)
                | State::Cursor(CursorState::Completed { .. })
                | State::CdcSnapshot(CdcSnapshotState::Completed)
                | State::CdcLog(CdcLogState::Completed { .. })
        )
    }

    /// Persisted form, `None` for non-serializable states
    pub fn to_value(&self) -> Option<StateValue> {
        let primary_key = |checkpoint: &Checkpoint| StateValue::PrimaryKey {
            pk_name: checkpoint.names(),
            pk_val: checkpoint.encoded_values(),
            cursor_field: None,
            cursor: None,
        };

        match self {
            State::Snapshot(SnapshotState::Ongoing { checkpoint })
            | State::CdcSnapshot(CdcSnapshotState::Ongoing { checkpoint }) => {
                Some(primary_key(checkpoint))
            }
            State::Snapshot(SnapshotState::Completed)
            | State::CdcSnapshot(CdcSnapshotState::Completed) => {
                Some(StateValue::SnapshotCompleted)
            }
            State::Cursor(CursorState::SnapshotOngoing {
                checkpoint,
                cursor,
                cursor_upper_bound,
            }) => Some(StateValue::PrimaryKey {
                pk_name: checkpoint.names(),
                pk_val: checkpoint.encoded_values(),
                cursor_field: Some(cursor.name.clone()),
                cursor: cursor_upper_bound.as_ref().map(ToString::to_string),
            }),
            State::Cursor(CursorState::Ongoing { cursor, value }) => {
                Some(StateValue::CursorBased {
                    cursor_field: cursor.name.clone(),
                    cursor: Some(value.to_string()),
                })
            }
            State::Cursor(CursorState::Completed { cursor, value }) => {
                Some(StateValue::CursorBased {
                    cursor_field: cursor.name.clone(),
                    cursor: value.as_ref().map(ToString::to_string),
                })
            }
            State::CdcLog(CdcLogState::Ongoing { offset } | CdcLogState::Completed { offset }) => {
                Some(StateValue::Cdc {
                    offset: offset.clone(),
                })
            }
            _ => None,
        }
    }

    /// Rebuild a stream's state from its persisted value
    ///
    /// Values that no longer fit the configured stream (changed mode,
    /// primary key or cursor) restart the stream with a warning. A full
    /// refresh that completed in an earlier sync starts over.
    pub fn restore(
        stream: &Stream,
        replication: ReplicationMethod,
        value: Option<&StateValue>,
    ) -> Result<Self> {
        let family = StateFamily::for_stream(stream.sync_mode, replication);
        let Some(value) = value else {
            return Ok(Self::not_started(family));
        };

        let restored = match (family, value) {
            (StateFamily::Snapshot, StateValue::SnapshotCompleted) => None,
            (StateFamily::CdcSnapshot, StateValue::SnapshotCompleted) => {
                Some(State::CdcSnapshot(CdcSnapshotState::Completed))
            }
            (StateFamily::Snapshot, StateValue::PrimaryKey { pk_name, pk_val, .. }) => {
                Checkpoint::decode(&stream.primary_key, pk_name, pk_val)?
                    .map(|checkpoint| State::Snapshot(SnapshotState::Ongoing { checkpoint }))
            }
            (StateFamily::CdcSnapshot, StateValue::PrimaryKey { pk_name, pk_val, .. }) => {
                Checkpoint::decode(&stream.primary_key, pk_name, pk_val)?.map(|checkpoint| {
                    State::CdcSnapshot(CdcSnapshotState::Ongoing { checkpoint })
                })
            }
            (
                StateFamily::Cursor,
                StateValue::PrimaryKey {
                    pk_name,
                    pk_val,
                    cursor_field,
                    cursor: cursor_upper_bound,
                },
            ) => {
                let cursor = configured_cursor(stream)?;
                if cursor_field.as_deref() == Some(cursor.name.as_str()) {
                    let cursor_upper_bound = cursor_upper_bound
                        .as_deref()
                        .map(|v| CursorValue::parse(cursor.field_type, v))
                        .transpose()?;
                    Checkpoint::decode(&stream.primary_key, pk_name, pk_val)?.map(|checkpoint| {
                        State::Cursor(CursorState::SnapshotOngoing {
                            checkpoint,
                            cursor: cursor.clone(),
                            cursor_upper_bound,
                        })
                    })
                } else {
                    None
                }
            }
            (
                StateFamily::Cursor,
                StateValue::CursorBased {
                    cursor_field,
                    cursor: Some(value),
                },
            ) => {
                let cursor = configured_cursor(stream)?;
                if cursor_field == &cursor.name {
                    Some(State::Cursor(CursorState::Ongoing {
                        cursor: cursor.clone(),
                        value: CursorValue::parse(cursor.field_type, value)?,
                    }))
                } else {
                    None
                }
            }
            (StateFamily::Cursor, StateValue::CursorBased { cursor: None, .. }) => {
                return Ok(Self::not_started(family));
            }
            _ => None,
        };

        Ok(restored.unwrap_or_else(|| {
            if !matches!(value, StateValue::SnapshotCompleted) {
                warn!(
                    stream = %stream.key,
                    "Saved state does not match the configured stream, starting over"
                );
            }
            Self::not_started(family)
        }))
    }
}

fn configured_cursor(stream: &Stream) -> Result<&Field> {
    stream
        .cursor
        .as_ref()
        .ok_or_else(|| Error::config(format!("stream '{}' has no cursor field", stream.key)))
}

// ============================================================================
// Persisted values
// ============================================================================

/// Persisted state of one stream or of the shared CDC position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state_type", rename_all = "snake_case")]
pub enum StateValue {
    PrimaryKey {
        pk_name: Vec<String>,
        pk_val: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cursor_field: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cursor: Option<String>,
    },
    SnapshotCompleted,
    CursorBased {
        cursor_field: String,
        cursor: Option<String>,
    },
    Cdc {
        offset: OpaqueStateValue,
    },
}

/// One stream's persisted state inside a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStateEntry {
    pub stream: StreamKey,
    pub state: StateValue,
}

/// A checkpoint emitted by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckpointMessage {
    /// A standalone stream
    Stream {
        stream: StreamKey,
        state: StateValue,
        record_count: u64,
    },
    /// The shared CDC position together with every nested stream
    Global {
        shared_state: OpaqueStateValue,
        stream_states: Vec<StreamStateEntry>,
        record_count: u64,
    },
}

impl CheckpointMessage {
    /// Records covered since the previous checkpoint of the same key
    pub fn record_count(&self) -> u64 {
        match self {
            CheckpointMessage::Stream { record_count, .. }
            | CheckpointMessage::Global { record_count, .. } => *record_count,
        }
    }
}

// ============================================================================
// Work results
// ============================================================================

/// Outcome of one unit of work against a key
#[derive(Debug, Clone, PartialEq)]
pub struct WorkResult {
    /// State the work started from
    pub input: State,
    /// State after the work
    pub output: State,
    /// Rows emitted by the work
    pub record_count: u64,
}

impl WorkResult {
    /// Create a new work result
    pub fn new(input: State, output: State, record_count: u64) -> Self {
        Self {
            input,
            output,
            record_count,
        }
    }
}
