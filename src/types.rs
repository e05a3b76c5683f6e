//! Common types used throughout Solidafy Extract
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use serde::{Deserialize, Serialize};

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

/// A single source row, keyed by column name
pub type Row = JsonObject;

/// Source-specific state payload persisted verbatim (CDC offsets)
pub type OpaqueStateValue = JsonValue;

// ============================================================================
// Sync Mode
// ============================================================================

/// Synchronization mode for streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Full refresh - read the whole table every time
    #[default]
    FullRefresh,
    /// Incremental - only read new/updated rows
    Incremental,
}

// ============================================================================
// Replication Method
// ============================================================================

/// How incremental streams are kept up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationMethod {
    /// Cursor column comparisons
    #[default]
    Standard,
    /// Initial snapshot followed by the source's change log
    Cdc,
}

// ============================================================================
// Invalid CDC Position Behavior
// ============================================================================

/// What to do when a saved CDC position is no longer retained by the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidCdcPositionBehavior {
    /// Fail the sync and require a manual reset
    #[default]
    FailSync,
    /// Discard saved CDC state and start over
    ResetSync,
}

// ============================================================================
// Log Level
// ============================================================================

/// Log level for connector messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}
