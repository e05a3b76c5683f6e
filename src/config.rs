//! Extraction configuration
//!
//! Tuning knobs for concurrency, partition sizing, sampling, fetch sizing and
//! CDC recovery. Loaded from YAML or JSON and validated before a sync starts.

use crate::error::{Error, Result};
use crate::types::{InvalidCdcPositionBehavior, ReplicationMethod};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Extract Config
// ============================================================================

/// Configuration for one extraction run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Maximum number of keys read concurrently
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// How incremental streams are replicated
    #[serde(default)]
    pub replication: ReplicationMethod,

    /// Desired size of one partition, in bytes
    #[serde(default = "default_target_partition_bytes")]
    pub target_partition_bytes: u64,

    /// Maximum number of rows read by a sampling query
    #[serde(default = "default_max_sample_size")]
    pub max_sample_size: usize,

    /// Lowest sampling rate, regardless of table size
    #[serde(default = "default_min_sample_rate")]
    pub min_sample_rate: f64,

    /// Memory budget for one fetch, used to derive the fetch size
    #[serde(default = "default_fetch_buffer_bytes")]
    pub fetch_buffer_bytes: u64,

    /// Fetch size used before any sample has been taken
    #[serde(default = "default_fetch_size")]
    pub default_fetch_size: usize,

    /// Lower clamp for the calibrated fetch size
    #[serde(default = "default_min_fetch_size")]
    pub min_fetch_size: usize,

    /// Upper clamp for the calibrated fetch size
    #[serde(default = "default_max_fetch_size")]
    pub max_fetch_size: usize,

    /// Soft timeout for one partition read, in seconds
    #[serde(default = "default_work_timeout_secs")]
    pub work_timeout_secs: u64,

    /// Policy when a saved CDC position is no longer retained
    #[serde(default)]
    pub invalid_cdc_position_behavior: InvalidCdcPositionBehavior,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_target_partition_bytes() -> u64 {
    256 * 1024 * 1024
}

fn default_max_sample_size() -> usize {
    1024
}

fn default_min_sample_rate() -> f64 {
    1.0 / 65_536.0
}

fn default_fetch_buffer_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_fetch_size() -> usize {
    1_000
}

fn default_min_fetch_size() -> usize {
    10
}

fn default_max_fetch_size() -> usize {
    100_000
}

fn default_work_timeout_secs() -> u64 {
    300
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            replication: ReplicationMethod::default(),
            target_partition_bytes: default_target_partition_bytes(),
            max_sample_size: default_max_sample_size(),
            min_sample_rate: default_min_sample_rate(),
            fetch_buffer_bytes: default_fetch_buffer_bytes(),
            default_fetch_size: default_fetch_size(),
            min_fetch_size: default_min_fetch_size(),
            max_fetch_size: default_max_fetch_size(),
            work_timeout_secs: default_work_timeout_secs(),
            invalid_cdc_position_behavior: InvalidCdcPositionBehavior::default(),
        }
    }
}

impl ExtractConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Set the concurrency limit
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set the replication method
    #[must_use]
    pub fn with_replication(mut self, replication: ReplicationMethod) -> Self {
        self.replication = replication;
        self
    }

    /// Set the target partition size
    #[must_use]
    pub fn with_target_partition_bytes(mut self, bytes: u64) -> Self {
        self.target_partition_bytes = bytes;
        self
    }

    /// Set the maximum sample size
    #[must_use]
    pub fn with_max_sample_size(mut self, size: usize) -> Self {
        self.max_sample_size = size;
        self
    }

    /// Set the default fetch size
    #[must_use]
    pub fn with_default_fetch_size(mut self, size: usize) -> Self {
        self.default_fetch_size = size;
        self
    }

    /// Set the soft timeout for one partition read
    #[must_use]
    pub fn with_work_timeout_secs(mut self, secs: u64) -> Self {
        self.work_timeout_secs = secs;
        self
    }

    /// Set the invalid CDC position policy
    #[must_use]
    pub fn with_invalid_cdc_position_behavior(
        mut self,
        behavior: InvalidCdcPositionBehavior,
    ) -> Self {
        self.invalid_cdc_position_behavior = behavior;
        self
    }

    /// Soft timeout for one partition read
    pub fn work_timeout(&self) -> Duration {
        Duration::from_secs(self.work_timeout_secs)
    }

    /// Reject non-positive or inconsistent values
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(Error::invalid_value("max_concurrency", "must be positive"));
        }
        if self.target_partition_bytes == 0 {
            return Err(Error::invalid_value(
                "target_partition_bytes",
                "must be positive",
            ));
        }
        if self.max_sample_size == 0 {
            return Err(Error::invalid_value("max_sample_size", "must be positive"));
        }
        if !(self.min_sample_rate > 0.0 && self.min_sample_rate <= 1.0) {
            return Err(Error::invalid_value(
                "min_sample_rate",
                "must be in (0, 1]",
            ));
        }
        if self.fetch_buffer_bytes == 0 {
            return Err(Error::invalid_value("fetch_buffer_bytes", "must be positive"));
        }
        if self.min_fetch_size == 0 || self.default_fetch_size == 0 {
            return Err(Error::invalid_value("fetch_size", "must be positive"));
        }
        if self.min_fetch_size > self.max_fetch_size {
            return Err(Error::invalid_value(
                "min_fetch_size",
                format!(
                    "{} exceeds max_fetch_size {}",
                    self.min_fetch_size, self.max_fetch_size
                ),
            ));
        }
        if self.work_timeout_secs == 0 {
            return Err(Error::invalid_value("work_timeout_secs", "must be positive"));
        }
        Ok(())
    }
}
