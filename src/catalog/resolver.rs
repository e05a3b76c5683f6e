//! Catalog validation
//!
//! Streams whose configuration cannot be read are excluded with a warning
//! instead of failing the whole sync.

use super::types::{Catalog, ConfiguredStream, Exclusion, Field, Stream};
use crate::error::Result;
use crate::types::{ReplicationMethod, SyncMode};
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

impl Catalog {
    /// Parse a catalog from YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a catalog from a `.json`, `.yaml` or `.yml` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Validate every configured stream
    ///
    /// Returns the streams to read and the ones that were left out.
    pub fn resolve(&self, replication: ReplicationMethod) -> (Vec<Stream>, Vec<Exclusion>) {
        let mut seen = HashSet::new();
        let mut streams = Vec::new();
        let mut excluded = Vec::new();

        for configured in &self.streams {
            let key = configured.key();
            let resolved = if seen.insert(key.clone()) {
                resolve_stream(configured, replication)
            } else {
                Err("duplicate stream in catalog".to_string())
            };

            match resolved {
                Ok(stream) => streams.push(stream),
                Err(reason) => {
                    warn!(stream = %key, %reason, "Excluding stream from sync");
                    excluded.push(Exclusion {
                        stream: key,
                        reason,
                    });
                }
            }
        }

        (streams, excluded)
    }
}

fn resolve_stream(
    configured: &ConfiguredStream,
    replication: ReplicationMethod,
) -> std::result::Result<Stream, String> {
    if configured.fields.is_empty() {
        return Err("no columns selected".to_string());
    }

    let lookup = |name: &str| -> std::result::Result<Field, String> {
        configured
            .fields
            .iter()
            .find(|f| f.name == name)
            .cloned()
            .ok_or_else(|| format!("column '{name}' is not selected"))
    };

    let primary_key = choose_primary_key(configured, &lookup)?;

    let cursor = match (configured.sync_mode, replication) {
        (SyncMode::Incremental, ReplicationMethod::Standard) => {
            let name = configured
                .cursor_field
                .as_deref()
                .ok_or_else(|| "incremental stream has no cursor field".to_string())?;
            let field = lookup(name).map_err(|e| format!("cursor field invalid: {e}"))?;
            if !field.field_type.is_orderable() {
                return Err(format!(
                    "cursor field '{}' has non-orderable type {}",
                    field.name, field.field_type
                ));
            }
            Some(field)
        }
        _ => None,
    };

    Ok(Stream {
        key: configured.key(),
        fields: configured.fields.clone(),
        primary_key,
        cursor,
        sync_mode: configured.sync_mode,
    })
}

fn choose_primary_key(
    configured: &ConfiguredStream,
    lookup: &dyn Fn(&str) -> std::result::Result<Field, String>,
) -> std::result::Result<Vec<Field>, String> {
    let mut last_error = None;
    for candidate in &configured.primary_key {
        if candidate.is_empty() {
            continue;
        }
        let fields: std::result::Result<Vec<Field>, String> =
            candidate.iter().map(|name| lookup(name.as_str())).collect();
        match fields {
            Ok(fields) if fields.iter().all(|f| f.field_type.is_orderable()) => {
                return Ok(fields)
            }
            Ok(_) => last_error = Some("primary key has a non-orderable column".to_string()),
            Err(e) => last_error = Some(format!("primary key invalid: {e}")),
        }
    }
    match last_error {
        Some(reason) => Err(reason),
        None => Ok(Vec::new()),
    }
}
