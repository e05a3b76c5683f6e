//! State management module
//!
//! Handles per-key progress tracking, checkpointing, and resumability.
//! Checkpoints are persisted between sync runs to enable incremental syncs.
//!
//! # Overview
//!
//! The state module provides:
//! - `Key` - A stream, or the global key shared by CDC streams
//! - `State` - Progress of one key, one variant family per read mode
//! - `StateManager` - Coordinator that deduplicates and rolls up checkpoints
//! - `StateStore` - File-based persistence of emitted checkpoints

mod key;
mod manager;
mod store;
mod types;

pub use key::{GlobalKey, Key, StreamKey};
pub use manager::StateManager;
pub use store::{GlobalStateEntry, PersistedState, StateStore};
pub use types::{
    CdcLogState, CdcSnapshotState, Checkpoint, CheckpointMessage, CursorState, SnapshotState,
    State, StateFamily, StateValue, StreamStateEntry, WorkResult,
};

#[cfg(test)]
mod manager_tests;
