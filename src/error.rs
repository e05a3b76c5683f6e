//! Error types for Solidafy Extract
//!
//! This module defines the error hierarchy for the extraction core.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use std::fmt;
use thiserror::Error;

/// How an invalid CDC position is expected to be recovered from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdcRecovery {
    /// The operator has to reset the connection before the next sync
    ManualReset,
    /// Saved CDC state is discarded and the next sync starts from scratch
    AutoResync,
}

impl fmt::Display for CdcRecovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CdcRecovery::ManualReset => write!(
                f,
                "please reset the connection, and then increase log retention and/or sync frequency"
            ),
            CdcRecovery::AutoResync => {
                write!(f, "saved state is discarded and a sync from scratch will run")
            }
        }
    }
}

/// The main error type for Solidafy Extract
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Catalog Errors
    // ============================================================================
    #[error("Stream '{stream}' excluded: {reason}")]
    StreamExcluded { stream: String, reason: String },

    #[error("Cannot decode value {value} as {field_type}: {message}")]
    ValueDecode {
        field_type: String,
        value: String,
        message: String,
    },

    // ============================================================================
    // Source I/O Errors
    // ============================================================================
    #[error("Query failed for stream '{stream}': {message}")]
    Query { stream: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("Output error: {message}")]
    Output { message: String },

    // ============================================================================
    // State Errors
    // ============================================================================
    #[error("State error: {message}")]
    State { message: String },

    #[error("Partition error for stream '{stream}': {message}")]
    Partition { stream: String, message: String },

    // ============================================================================
    // CDC Errors
    // ============================================================================
    #[error("Saved CDC offset is no longer present on the server: {message}; {recovery}")]
    InvalidCdcPosition {
        recovery: CdcRecovery,
        message: String,
    },

    #[error("Invalid CDC position '{value}': {message}")]
    CdcPosition { value: String, message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a stream exclusion error
    pub fn excluded(stream: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StreamExcluded {
            stream: stream.into(),
            reason: reason.into(),
        }
    }

    /// Create a value decoding error
    pub fn decode(
        field_type: impl fmt::Display,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ValueDecode {
            field_type: field_type.to_string(),
            value: value.into(),
            message: message.into(),
        }
    }

    /// Create a query error
    pub fn query(stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            stream: stream.into(),
            message: message.into(),
        }
    }

    /// Create a state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Create a partition error
    pub fn partition(stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Partition {
            stream: stream.into(),
            message: message.into(),
        }
    }

    /// Create an invalid CDC position error
    pub fn invalid_cdc_position(recovery: CdcRecovery, message: impl Into<String>) -> Self {
        Self::InvalidCdcPosition {
            recovery,
            message: message.into(),
        }
    }

    /// Create a CDC position parse error
    pub fn cdc_position(value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CdcPosition {
            value: value.into(),
            message: message.into(),
        }
    }

    /// Create an output error
    pub fn output(message: impl Into<String>) -> Self {
        Self::Output {
            message: message.into(),
        }
    }

    /// Check if this error comes from source I/O
    ///
    /// Transient errors are never retried inside the core: they fail the
    /// affected key only and leave the last emitted checkpoint intact.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Query { .. } | Error::Database(_) | Error::Io(_)
        )
    }
}

/// Result type alias for Solidafy Extract
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
