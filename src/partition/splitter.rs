//! Adaptive sampling splitter
//!
//! Splits a large partition into pieces of roughly the target byte size by
//! sampling rows in checkpoint order and keeping a thinned subset of them as
//! boundaries. The sample also calibrates the fetch size.

use super::factory::PartitionFactory;
use super::types::Partition;
use crate::config::ExtractConfig;
use crate::error::Result;
use crate::source::QueryExecutor;
use crate::value::{compare_tuples, CursorValue};
use rand::Rng;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

/// Sizing knobs for splitting and fetching
#[derive(Debug, Clone, PartialEq)]
pub struct SplitterConfig {
    pub target_partition_bytes: u64,
    pub max_sample_size: usize,
    pub min_sample_rate: f64,
    pub fetch_buffer_bytes: u64,
    pub default_fetch_size: usize,
    pub min_fetch_size: usize,
    pub max_fetch_size: usize,
}

impl From<&ExtractConfig> for SplitterConfig {
    fn from(config: &ExtractConfig) -> Self {
        Self {
            target_partition_bytes: config.target_partition_bytes,
            max_sample_size: config.max_sample_size,
            min_sample_rate: config.min_sample_rate,
            fetch_buffer_bytes: config.fetch_buffer_bytes,
            default_fetch_size: config.default_fetch_size,
            min_fetch_size: config.min_fetch_size,
            max_fetch_size: config.max_fetch_size,
        }
    }
}

/// Checkpoint values of sampled rows, in checkpoint order
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub values: Vec<Vec<CursorValue>>,
    pub avg_row_bytes: f64,
    pub rate: f64,
}

/// What sampling found out about a partition's table
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// The table has no rows
    EmptyTable,
    /// The table already fits one partition
    BelowTarget,
    Sampled(Sample),
}

/// Partitions to read in order, and the fetch size to read them with
#[derive(Debug, Clone, PartialEq)]
pub struct SplitPlan {
    pub partitions: Vec<Partition>,
    pub fetch_size: usize,
}

/// Sampling-driven partition splitter
pub struct AdaptiveSplitter {
    executor: Arc<dyn QueryExecutor>,
    config: SplitterConfig,
}

impl AdaptiveSplitter {
    /// Create a new splitter
    pub fn new(executor: Arc<dyn QueryExecutor>, config: SplitterConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Plan how to read a partition
    pub async fn plan(&self, factory: &PartitionFactory, partition: Partition) -> Result<SplitPlan> {
        let default_plan = |partitions| SplitPlan {
            partitions,
            fetch_size: self.config.default_fetch_size,
        };
        if !partition.is_splittable() {
            return Ok(default_plan(vec![partition]));
        }

        let sample = match self.sample(&partition).await? {
            SampleOutcome::EmptyTable => {
                debug!(stream = %partition.stream(), "Table is empty");
                return Ok(default_plan(vec![partition.as_empty()]));
            }
            SampleOutcome::BelowTarget => {
                return Ok(default_plan(vec![partition.unsplittable()]));
            }
            SampleOutcome::Sampled(sample) if sample.values.is_empty() => {
                return Ok(default_plan(vec![partition.unsplittable()]));
            }
            SampleOutcome::Sampled(sample) => sample,
        };

        let fetch_size = self.fetch_size(sample.avg_row_bytes);
        let boundaries = self.boundaries(&partition, &sample, &mut rand::rng());
        let partitions = factory.split(&partition, boundaries);
        info!(
            stream = %partition.stream(),
            partitions = partitions.len(),
            sampled = sample.values.len(),
            avg_row_bytes = sample.avg_row_bytes,
            fetch_size,
            "Split partition"
        );
        Ok(SplitPlan {
            partitions,
            fetch_size,
        })
    }

    /// Estimate the table and sample the partition if it is large enough
    pub async fn sample(&self, partition: &Partition) -> Result<SampleOutcome> {
        let estimate = self.executor.estimate_size(partition.stream()).await?;
        if estimate.row_count == 0 {
            return Ok(SampleOutcome::EmptyTable);
        }
        if estimate.byte_size <= self.config.target_partition_bytes {
            return Ok(SampleOutcome::BelowTarget);
        }

        let rate = (self.config.max_sample_size as f64 / estimate.row_count as f64)
            .max(self.config.min_sample_rate)
            .min(1.0);
        let query = partition.sampling_query(rate, self.config.max_sample_size as u64);
        let rows = self.executor.sample(query).await?;

        let mut total_bytes = 0usize;
        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            total_bytes += serde_json::to_vec(row).map_or(0, |bytes| bytes.len());
            if let Some(checkpoint) = partition.checkpoint_values(row)? {
                values.push(checkpoint);
            }
        }
        let avg_row_bytes = if rows.is_empty() {
            estimate.avg_row_bytes()
        } else {
            total_bytes as f64 / rows.len() as f64
        };

        Ok(SampleOutcome::Sampled(Sample {
            values,
            avg_row_bytes,
            rate,
        }))
    }

    /// Thin sampled values into split boundaries
    ///
    /// Each sampled row stands for `1 / rate` rows, so a value is kept with
    /// probability `(avg_row_bytes / rate) / target`. Kept values are
    /// strictly increasing and strictly inside the partition's bounds.
    pub fn boundaries<R: Rng + ?Sized>(
        &self,
        partition: &Partition,
        sample: &Sample,
        rng: &mut R,
    ) -> Vec<Vec<CursorValue>> {
        let bytes_per_sample = sample.avg_row_bytes / sample.rate;
        let keep = (bytes_per_sample / self.config.target_partition_bytes as f64).min(1.0);

        let mut boundaries: Vec<Vec<CursorValue>> = Vec::new();
        for value in &sample.values {
            if rng.random::<f64>() >= keep {
                continue;
            }
            let above_last = match boundaries.last() {
                Some(last) => compare_tuples(value, last) == Some(Ordering::Greater),
                None => partition
                    .lower_bound()
                    .is_none_or(|lower| compare_tuples(value, lower) == Some(Ordering::Greater)),
            };
            let below_upper = partition
                .upper_bound()
                .is_none_or(|upper| compare_tuples(value, upper) == Some(Ordering::Less));
            if above_last && below_upper {
                boundaries.push(value.clone());
            }
        }
        boundaries
    }

    /// Rows per fetch that fit the fetch buffer
    pub fn fetch_size(&self, avg_row_bytes: f64) -> usize {
        if avg_row_bytes <= 0.0 {
            return self.config.default_fetch_size;
        }
        let rows = (self.config.fetch_buffer_bytes as f64 / avg_row_bytes) as usize;
        rows.clamp(self.config.min_fetch_size, self.config.max_fetch_size)
    }
}
