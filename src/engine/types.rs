//! Engine types
//!
//! Message types and statistics for the sync engine.

use crate::state::{CheckpointMessage, StreamKey};
use crate::types::{LogLevel, Row};
use serde_json::{json, Value};

/// A message emitted during sync
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A single row
    Record {
        /// Stream the row belongs to
        stream: StreamKey,
        /// Column values
        data: Row,
        /// Milliseconds since the epoch
        emitted_at: i64,
    },
    /// A checkpoint covering every record sent before it
    State(CheckpointMessage),
    /// Log message
    Log {
        /// Log level
        level: LogLevel,
        /// Log message
        message: String,
    },
}

impl Message {
    /// Create a record message stamped with the current time
    pub fn record(stream: StreamKey, data: Row) -> Self {
        Self::Record {
            stream,
            data,
            emitted_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a log message
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            level,
            message: message.into(),
        }
    }

    /// Create an info log
    pub fn info(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Info, message)
    }

    /// Create a warning log
    pub fn warn(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Warn, message)
    }

    /// Create an error log
    pub fn error(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Error, message)
    }

    /// Check if this is a record message
    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record { .. })
    }

    /// Check if this is a state message
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State(_))
    }

    /// Check if this is a log message
    pub fn is_log(&self) -> bool {
        matches!(self, Self::Log { .. })
    }

    /// Protocol JSON form, one message per output line
    pub fn to_json(&self) -> Value {
        match self {
            Message::Record {
                stream,
                data,
                emitted_at,
            } => json!({
                "type": "RECORD",
                "record": {
                    "namespace": stream.namespace,
                    "stream": stream.name,
                    "data": data,
                    "emitted_at": emitted_at
                }
            }),
            Message::State(checkpoint) => json!({
                "type": "STATE",
                "state": checkpoint
            }),
            Message::Log { level, message } => json!({
                "type": "LOG",
                "log": {
                    "level": level,
                    "message": message
                }
            }),
        }
    }
}

/// Statistics from a sync operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStats {
    /// Total records emitted
    pub records_synced: u64,
    /// Total checkpoints emitted
    pub checkpoints_emitted: u64,
    /// Keys that ran to completion
    pub keys_completed: usize,
    /// Partitions read
    pub partitions_read: usize,
    /// Keys that failed, with their errors
    pub failures: Vec<(String, String)>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl SyncStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed key
    pub fn add_failure(&mut self, key: impl Into<String>, error: impl Into<String>) {
        self.failures.push((key.into(), error.into()));
    }

    /// Whether every key succeeded
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold another key's stats into these
    pub fn merge(&mut self, other: SyncStats) {
        self.records_synced += other.records_synced;
        self.checkpoints_emitted += other.checkpoints_emitted;
        self.keys_completed += other.keys_completed;
        self.partitions_read += other.partitions_read;
        self.failures.extend(other.failures);
    }

    /// Set duration
    pub fn set_duration(&mut self, ms: u64) {
        self.duration_ms = ms;
    }
}
