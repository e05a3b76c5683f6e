//! Catalog types
//!
//! The catalog is resolved upstream; these types only carry what the
//! extraction core needs: selected columns, key candidates, cursor and mode.

use crate::state::StreamKey;
use crate::types::SyncMode;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Fields
// ============================================================================

/// Logical type of a column, as far as ordering and state encoding care
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Boolean,
    Integer,
    Number,
    String,
    Date,
    TimestampWithoutTimezone,
    TimestampWithTimezone,
    Binary,
    Json,
}

impl FieldType {
    /// Values of this type can be compared and used as a checkpoint
    pub fn is_orderable(self) -> bool {
        !matches!(self, FieldType::Json)
    }

    /// Values of this type can serve as split boundaries
    pub fn is_splittable(self) -> bool {
        matches!(
            self,
            FieldType::Integer
                | FieldType::Number
                | FieldType::String
                | FieldType::Date
                | FieldType::TimestampWithoutTimezone
                | FieldType::TimestampWithTimezone
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Boolean => "boolean",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::String => "string",
            FieldType::Date => "date",
            FieldType::TimestampWithoutTimezone => "timestamp_without_timezone",
            FieldType::TimestampWithTimezone => "timestamp_with_timezone",
            FieldType::Binary => "binary",
            FieldType::Json => "json",
        };
        f.write_str(name)
    }
}

/// A selected column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Column name
    pub name: String,
    /// Column type
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl Field {
    /// Create a new field
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

// ============================================================================
// Configured Streams
// ============================================================================

/// A stream as configured by the user, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfiguredStream {
    /// Stream (table) name
    pub name: String,

    /// Namespace (schema)
    #[serde(default)]
    pub namespace: Option<String>,

    /// Selected columns
    pub fields: Vec<Field>,

    /// Candidate primary keys, first valid candidate wins
    #[serde(default)]
    pub primary_key: Vec<Vec<String>>,

    /// Cursor column for incremental reads
    #[serde(default)]
    pub cursor_field: Option<String>,

    /// Configured sync mode
    #[serde(default)]
    pub sync_mode: SyncMode,
}

impl ConfiguredStream {
    /// Create a full-refresh stream without keys
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            fields,
            primary_key: Vec::new(),
            cursor_field: None,
            sync_mode: SyncMode::FullRefresh,
        }
    }

    /// Set namespace
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Add a primary key candidate
    #[must_use]
    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key
            .push(columns.iter().map(ToString::to_string).collect());
        self
    }

    /// Set the cursor column
    #[must_use]
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor_field = Some(cursor.into());
        self
    }

    /// Set the sync mode
    #[must_use]
    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    /// Key identifying this stream
    pub fn key(&self) -> StreamKey {
        StreamKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

/// A validated stream, ready for extraction
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub key: StreamKey,
    pub fields: Vec<Field>,
    /// Chosen primary key; empty when the stream has none
    pub primary_key: Vec<Field>,
    pub cursor: Option<Field>,
    pub sync_mode: SyncMode,
}

impl Stream {
    /// Whether rows can be ordered by a unique key
    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Look up a selected field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A stream left out of the sync, with the reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion {
    pub stream: StreamKey,
    pub reason: String,
}

impl From<Exclusion> for crate::Error {
    fn from(exclusion: Exclusion) -> Self {
        crate::Error::excluded(exclusion.stream.to_string(), exclusion.reason)
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// The configured catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub streams: Vec<ConfiguredStream>,
}
