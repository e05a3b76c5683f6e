//! Checkpoint persistence
//!
//! Folds emitted checkpoint messages into a JSON state file with atomic
//! writes. The file is the input of the next sync.

use super::key::StreamKey;
use super::types::{CheckpointMessage, StateValue, StreamStateEntry};
use crate::error::{Error, Result};
use crate::types::OpaqueStateValue;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

// ============================================================================
// Persisted State
// ============================================================================

/// Shared CDC state and the streams that share it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalStateEntry {
    pub shared_state: OpaqueStateValue,
    #[serde(default)]
    pub stream_states: Vec<StreamStateEntry>,
}

/// Everything persisted between syncs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub streams: Vec<StreamStateEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<GlobalStateEntry>,
}

impl PersistedState {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Saved state of a stream, looking into the global entry first
    pub fn stream_state(&self, stream: &StreamKey) -> Option<&StateValue> {
        let global = self
            .global
            .as_ref()
            .and_then(|g| g.stream_states.iter().find(|e| &e.stream == stream));
        global
            .or_else(|| self.streams.iter().find(|e| &e.stream == stream))
            .map(|e| &e.state)
    }

    /// Saved shared CDC state
    pub fn shared_state(&self) -> Option<&OpaqueStateValue> {
        self.global.as_ref().map(|g| &g.shared_state)
    }

    /// Fold one checkpoint into this state
    pub fn apply(&mut self, message: &CheckpointMessage) {
        match message {
            CheckpointMessage::Stream { stream, state, .. } => {
                upsert(&mut self.streams, stream, state);
            }
            CheckpointMessage::Global {
                shared_state,
                stream_states,
                ..
            } => {
                let global = self.global.get_or_insert_with(|| GlobalStateEntry {
                    shared_state: shared_state.clone(),
                    stream_states: Vec::new(),
                });
                global.shared_state = shared_state.clone();
                for entry in stream_states {
                    upsert(&mut global.stream_states, &entry.stream, &entry.state);
                    self.streams.retain(|e| e.stream != entry.stream);
                }
            }
        }
    }
}

fn upsert(entries: &mut Vec<StreamStateEntry>, stream: &StreamKey, state: &StateValue) {
    match entries.iter_mut().find(|e| &e.stream == stream) {
        Some(entry) => entry.state = state.clone(),
        None => entries.push(StreamStateEntry {
            stream: stream.clone(),
            state: state.clone(),
        }),
    }
}

// ============================================================================
// State Store
// ============================================================================

/// File-backed store for persisted state
#[derive(Debug, Clone)]
pub struct StateStore {
    /// Path to the state file, empty when in memory
    path: PathBuf,
    state: Arc<RwLock<PersistedState>>,
}

impl StateStore {
    /// Open a store, loading the file if it exists
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| Error::State {
                message: format!("Failed to read state file: {e}"),
            })?;
            parse_state(&contents)?
        } else {
            PersistedState::new()
        };

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Create an in-memory store from inline JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self {
            path: PathBuf::new(),
            state: Arc::new(RwLock::new(parse_state(json)?)),
        })
    }

    /// Create an empty in-memory store
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            state: Arc::new(RwLock::new(PersistedState::new())),
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str().is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> PersistedState {
        self.state.read().await.clone()
    }

    /// Fold a checkpoint into the state and save it
    pub async fn apply(&self, message: &CheckpointMessage) -> Result<()> {
        self.state.write().await.apply(message);
        self.save().await
    }

    /// Save current state to file
    pub async fn save(&self) -> Result<()> {
        if self.is_in_memory() {
            return Ok(());
        }

        let contents = {
            let state = self.state.read().await;
            serde_json::to_string_pretty(&*state).map_err(|e| Error::State {
                message: format!("Failed to serialize state: {e}"),
            })?
        };

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| Error::State {
                message: format!("Failed to write state file: {e}"),
            })?;

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::State {
                message: format!("Failed to rename state file: {e}"),
            })?;

        Ok(())
    }
}

fn parse_state(contents: &str) -> Result<PersistedState> {
    if contents.trim().is_empty() {
        return Ok(PersistedState::new());
    }
    serde_json::from_str(contents).map_err(|e| Error::State {
        message: format!("Failed to parse state: {e}"),
    })
}
