//! Query execution capability

use super::query::{SelectQuery, TableSizeEstimate};
use crate::catalog::Field;
use crate::error::Result;
use crate::state::StreamKey;
use crate::types::Row;
use crate::value::CursorValue;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;

/// Lazily produced rows
pub type RowStream<'a> = BoxStream<'a, Result<Row>>;

/// Runs queries against a source
///
/// Implementations turn `SelectQuery` descriptions into their own dialect.
/// Rows must come back in `order_by` order.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Stream the rows of a query, fetching `fetch_size` rows at a time
    fn read(&self, query: SelectQuery, fetch_size: usize) -> RowStream<'_>;

    /// Run a sampling query to completion
    async fn sample(&self, query: SelectQuery) -> Result<Vec<Row>> {
        let fetch_size = query
            .limit
            .map_or(1_000, |limit| limit.clamp(1, 10_000) as usize);
        self.read(query, fetch_size).try_collect().await
    }

    /// Largest value tuple of the given columns, ignoring rows with nulls
    async fn upper_bound(
        &self,
        stream: &StreamKey,
        columns: &[Field],
    ) -> Result<Option<Vec<CursorValue>>>;

    /// Approximate row count and byte size of a stream's table
    async fn estimate_size(&self, stream: &StreamKey) -> Result<TableSizeEstimate>;
}
