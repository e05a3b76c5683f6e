//! Query descriptions handed to a `QueryExecutor`

use crate::catalog::Field;
use crate::state::StreamKey;
use crate::value::{compare_tuples, CursorValue};
use std::cmp::Ordering;

/// A bounded, ordered select over one stream
///
/// Bounds apply to the `order_by` columns as a tuple: the lower bound is
/// exclusive, the upper bound inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub stream: StreamKey,
    pub columns: Vec<Field>,
    pub order_by: Vec<Field>,
    pub lower_bound: Option<Vec<CursorValue>>,
    pub upper_bound: Option<Vec<CursorValue>>,
    /// Keep each row with this probability
    pub sample_rate: Option<f64>,
    pub limit: Option<u64>,
}

impl SelectQuery {
    /// Create an unbounded, unordered select
    pub fn new(stream: StreamKey, columns: Vec<Field>) -> Self {
        Self {
            stream,
            columns,
            order_by: Vec::new(),
            lower_bound: None,
            upper_bound: None,
            sample_rate: None,
            limit: None,
        }
    }

    /// Order by these columns
    #[must_use]
    pub fn with_order_by(mut self, order_by: Vec<Field>) -> Self {
        self.order_by = order_by;
        self
    }

    /// Restrict to `(lower, upper]`
    #[must_use]
    pub fn with_bounds(
        mut self,
        lower: Option<Vec<CursorValue>>,
        upper: Option<Vec<CursorValue>>,
    ) -> Self {
        self.lower_bound = lower;
        self.upper_bound = upper;
        self
    }

    /// Keep rows with the given probability
    #[must_use]
    pub fn with_sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    /// Return at most this many rows
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_bounded(&self) -> bool {
        self.lower_bound.is_some() || self.upper_bound.is_some()
    }

    /// Whether an ordering tuple falls inside `(lower, upper]`
    pub fn in_bounds(&self, values: &[CursorValue]) -> bool {
        let above = self
            .lower_bound
            .as_ref()
            .is_none_or(|lower| compare_tuples(values, lower) == Some(Ordering::Greater));
        let below = self.upper_bound.as_ref().is_none_or(|upper| {
            matches!(
                compare_tuples(values, upper),
                Some(Ordering::Less | Ordering::Equal)
            )
        });
        above && below
    }
}

/// Approximate size of a table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableSizeEstimate {
    pub row_count: u64,
    pub byte_size: u64,
}

impl TableSizeEstimate {
    /// Average row size in bytes, zero for an empty table
    pub fn avg_row_bytes(&self) -> f64 {
        if self.row_count == 0 {
            0.0
        } else {
            self.byte_size as f64 / self.row_count as f64
        }
    }
}
