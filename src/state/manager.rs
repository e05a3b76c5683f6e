//! Checkpoint coordinator
//!
//! Tracks a committed and a pending state per key, accumulates record
//! counts, and turns pending progress into checkpoint messages.
//!
//! Cells live in an arena indexed by key. Every mutation of a cell happens
//! under that cell's own lock, so keys never contend with each other.
//! Checkpoint passes are serialized by a separate coordinator lock, which is
//! always taken before any cell lock and never while holding one. The global
//! rollup visits nested cells one at a time.

use super::key::{GlobalKey, Key, StreamKey};
use super::types::{CheckpointMessage, State, StateValue, StreamStateEntry, WorkResult};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

#[derive(Debug)]
struct Cell {
    key: Key,
    current: State,
    pending: State,
    pending_count: u64,
}

impl Cell {
    fn transition(&mut self, state: State) -> Result<()> {
        if state.family() != self.pending.family() {
            return Err(Error::state(format!(
                "key {} cannot move from {:?} to {:?} state",
                self.key,
                self.pending.family(),
                state.family()
            )));
        }
        if self.pending.is_terminal() && state != self.pending {
            return Err(Error::state(format!(
                "key {} is already completed",
                self.key
            )));
        }
        self.pending = state;
        Ok(())
    }

    /// Promote pending to current if it is serializable; reports a change
    fn promote(&mut self) -> bool {
        if !self.pending.is_serializable() || self.pending == self.current {
            return false;
        }
        self.current = self.pending.clone();
        true
    }

    fn take_count(&mut self) -> u64 {
        std::mem::take(&mut self.pending_count)
    }
}

#[derive(Debug)]
struct GlobalGroup {
    key: GlobalKey,
    cell: usize,
    nested: Vec<usize>,
}

/// Coordinates state updates from concurrently running keys
#[derive(Debug)]
pub struct StateManager {
    index: HashMap<Key, usize>,
    cells: Vec<Mutex<Cell>>,
    global: Option<GlobalGroup>,
    checkpoint_lock: Mutex<()>,
}

impl StateManager {
    /// Create a coordinator over the given keys and their initial states
    ///
    /// At most one global key is allowed; every stream it names must also be
    /// registered as a stream key.
    pub fn new(initial: impl IntoIterator<Item = (Key, State)>) -> Result<Self> {
        let mut index = HashMap::new();
        let mut cells = Vec::new();
        let mut global_key = None;

        for (key, state) in initial {
            if index.contains_key(&key) {
                return Err(Error::state(format!("key {key} registered twice")));
            }
            if let Key::Global(global) = &key {
                if global_key.is_some() {
                    return Err(Error::state("only one global key is supported"));
                }
                global_key = Some(global.clone());
            }
            index.insert(key.clone(), cells.len());
            cells.push(Mutex::new(Cell {
                key,
                current: state.clone(),
                pending: state,
                pending_count: 0,
            }));
        }

        let global = match global_key {
            Some(key) => {
                let nested = key
                    .streams()
                    .map(|stream| {
                        index
                            .get(&Key::Stream(stream.clone()))
                            .copied()
                            .ok_or_else(|| {
                                Error::state(format!("{key} names unknown stream {stream}"))
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let cell = index[&Key::Global(key.clone())];
                Some(GlobalGroup { key, cell, nested })
            }
            None => None,
        };

        Ok(Self {
            index,
            cells,
            global,
            checkpoint_lock: Mutex::new(()),
        })
    }

    /// Registered keys, in registration order
    pub fn keys(&self) -> Vec<Key> {
        self.cells.iter().map(|cell| cell.lock().key.clone()).collect()
    }

    /// The global key, if one is registered
    pub fn global_key(&self) -> Option<&GlobalKey> {
        self.global.as_ref().map(|g| &g.key)
    }

    fn cell(&self, key: &Key) -> Result<&Mutex<Cell>> {
        self.index
            .get(key)
            .map(|&idx| &self.cells[idx])
            .ok_or_else(|| Error::state(format!("unknown key {key}")))
    }

    /// Last committed state
    pub fn current(&self, key: &Key) -> Result<State> {
        Ok(self.cell(key)?.lock().current.clone())
    }

    /// Latest known state, committed or not
    pub fn latest(&self, key: &Key) -> Result<State> {
        Ok(self.cell(key)?.lock().pending.clone())
    }

    /// Record new pending progress for a key
    ///
    /// The state replaces the pending one; the count adds to it.
    pub fn set(&self, key: &Key, state: State, record_count: u64) -> Result<()> {
        let mut cell = self.cell(key)?.lock();
        cell.transition(state)?;
        cell.pending_count += record_count;
        Ok(())
    }

    /// Add rows to a key without changing its state
    pub fn add_records(&self, key: &Key, record_count: u64) -> Result<()> {
        self.cell(key)?.lock().pending_count += record_count;
        Ok(())
    }

    /// Apply a work result, rejecting it if the key moved on meanwhile
    pub fn apply(&self, key: &Key, result: &WorkResult) -> Result<()> {
        let mut cell = self.cell(key)?.lock();
        if cell.pending != result.input {
            return Err(Error::state(format!(
                "stale work result for key {key}: started from {:?}, pending is {:?}",
                result.input, cell.pending
            )));
        }
        cell.transition(result.output.clone())?;
        cell.pending_count += result.record_count;
        Ok(())
    }

    /// Apply a change-log result and its per-stream row counts together
    ///
    /// No checkpoint pass can observe the log position without the rows
    /// that were read up to it.
    pub fn apply_global(
        &self,
        key: &GlobalKey,
        result: &WorkResult,
        stream_counts: &HashMap<StreamKey, u64>,
    ) -> Result<()> {
        let _pass = self.checkpoint_lock.lock();
        for stream in stream_counts.keys() {
            if !key.contains(stream) {
                return Err(Error::state(format!("{stream} is not part of {key}")));
            }
        }
        self.apply(&Key::Global(key.clone()), result)?;
        for (stream, count) in stream_counts {
            self.add_records(&Key::Stream(stream.clone()), *count)?;
        }
        Ok(())
    }

    /// Commit pending progress and return the resulting checkpoints
    ///
    /// Emits at most one message per standalone stream and one composite
    /// message for the global key. Calling it again without intervening
    /// updates returns nothing.
    pub fn checkpoint(&self) -> Vec<CheckpointMessage> {
        let _pass = self.checkpoint_lock.lock();
        let nested: HashSet<usize> = self
            .global
            .iter()
            .flat_map(|g| g.nested.iter().copied().chain(std::iter::once(g.cell)))
            .collect();

        let mut messages = Vec::new();
        for (idx, cell) in self.cells.iter().enumerate() {
            if nested.contains(&idx) {
                continue;
            }
            let mut cell = cell.lock();
            if !cell.pending.is_serializable() {
                continue;
            }
            let changed = cell.promote();
            if !changed && cell.pending_count == 0 {
                continue;
            }
            let record_count = cell.take_count();
            let (Key::Stream(stream), Some(state)) = (&cell.key, cell.current.to_value()) else {
                continue;
            };
            messages.push(CheckpointMessage::Stream {
                stream: stream.clone(),
                state,
                record_count,
            });
        }

        if let Some(group) = &self.global {
            if let Some(message) = self.rollup(group) {
                messages.push(message);
            }
        }
        messages
    }

    fn rollup(&self, group: &GlobalGroup) -> Option<CheckpointMessage> {
        let (mut changed, mut record_count, shared_state) = {
            let mut cell = self.cells[group.cell].lock();
            let changed = cell.promote();
            let shared_state = match cell.current.to_value() {
                Some(StateValue::Cdc { offset }) => offset,
                _ => return None,
            };
            (changed, cell.take_count(), shared_state)
        };

        let mut stream_states = Vec::with_capacity(group.nested.len());
        for &idx in &group.nested {
            let mut cell = self.cells[idx].lock();
            changed |= cell.promote();
            record_count += cell.take_count();
            if let (Key::Stream(stream), Some(state)) = (&cell.key, cell.current.to_value()) {
                stream_states.push(StreamStateEntry {
                    stream: stream.clone(),
                    state,
                });
            }
        }

        (changed || record_count > 0).then_some(CheckpointMessage::Global {
            shared_state,
            stream_states,
            record_count,
        })
    }
}
