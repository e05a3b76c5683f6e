//! Partition module
//!
//! Turns stream states into bounded, resumable reads.
//!
//! # Overview
//!
//! - `Partition` - Immutable `(lower, upper]` slice of a stream in checkpoint order
//! - `PartitionFactory` - Picks the next partition from a stream's state
//! - `AdaptiveSplitter` - Samples large partitions and splits them near a target size

mod factory;
mod splitter;
mod types;

pub use factory::PartitionFactory;
pub use splitter::{AdaptiveSplitter, Sample, SampleOutcome, SplitPlan, SplitterConfig};
pub use types::{Partition, PartitionKind};
