//! In-memory query executor
//!
//! Holds tables as JSON rows. Used for tests and dry runs; supports
//! seeded sampling and injected read failures.

use super::executor::{QueryExecutor, RowStream};
use super::query::{SelectQuery, TableSizeEstimate};
use crate::catalog::Field;
use crate::error::{Error, Result};
use crate::state::StreamKey;
use crate::types::Row;
use crate::value::{compare_tuples, CursorValue};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
struct MemoryTable {
    rows: Vec<Row>,
}

/// Query executor over in-memory tables
#[derive(Debug)]
pub struct MemorySource {
    tables: RwLock<HashMap<StreamKey, MemoryTable>>,
    failing: Mutex<HashSet<StreamKey>>,
    rng: Mutex<StdRng>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl MemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty source with a fixed sampling seed
    pub fn with_seed(seed: u64) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Create or replace a table
    pub fn add_table(&self, stream: StreamKey, rows: Vec<Row>) {
        self.tables.write().insert(stream, MemoryTable { rows });
    }

    /// Append rows to an existing table, creating it if needed
    pub fn insert_rows(&self, stream: &StreamKey, rows: impl IntoIterator<Item = Row>) {
        self.tables
            .write()
            .entry(stream.clone())
            .or_insert_with(|| MemoryTable { rows: Vec::new() })
            .rows
            .extend(rows);
    }

    /// Make every subsequent read of a stream fail
    pub fn fail_reads(&self, stream: StreamKey) {
        self.failing.lock().insert(stream);
    }

    fn table(&self, stream: &StreamKey) -> Result<MemoryTable> {
        if self.failing.lock().contains(stream) {
            return Err(Error::query(stream.to_string(), "connection reset by peer"));
        }
        self.tables
            .read()
            .get(stream)
            .cloned()
            .ok_or_else(|| Error::query(stream.to_string(), "table does not exist"))
    }

    fn select(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        let table = self.table(&query.stream)?;

        let mut keyed = Vec::with_capacity(table.rows.len());
        for row in table.rows {
            let key = ordering_values(&row, &query.order_by)?;
            let included = match &key {
                Some(values) => query.in_bounds(values),
                None => !query.is_bounded(),
            };
            if included {
                keyed.push((key, row));
            }
        }

        if let Some(rate) = query.sample_rate {
            let mut rng = self.rng.lock();
            keyed.retain(|_| rng.random::<f64>() < rate);
        }

        if !query.order_by.is_empty() {
            keyed.sort_by(|(a, _), (b, _)| match (a, b) {
                (Some(a), Some(b)) => compare_tuples(a, b).unwrap_or(Ordering::Equal),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            });
        }

        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(keyed
            .into_iter()
            .take(limit)
            .map(|(_, row)| project(row, &query.columns))
            .collect())
    }
}

fn ordering_values(row: &Row, columns: &[Field]) -> Result<Option<Vec<CursorValue>>> {
    let mut values = Vec::with_capacity(columns.len());
    for column in columns {
        let raw = row.get(&column.name).unwrap_or(&serde_json::Value::Null);
        match CursorValue::from_json(column.field_type, raw)? {
            Some(value) => values.push(value),
            None => return Ok(None),
        }
    }
    Ok(Some(values))
}

fn project(mut row: Row, columns: &[Field]) -> Row {
    if columns.is_empty() {
        return row;
    }
    let mut projected = Row::new();
    for column in columns {
        let value = row.remove(&column.name).unwrap_or(serde_json::Value::Null);
        projected.insert(column.name.clone(), value);
    }
    projected
}

#[async_trait]
impl QueryExecutor for MemorySource {
    fn read(&self, query: SelectQuery, _fetch_size: usize) -> RowStream<'_> {
        match self.select(&query) {
            Ok(rows) => stream::iter(rows.into_iter().map(Ok)).boxed(),
            Err(e) => stream::iter(std::iter::once(Err(e))).boxed(),
        }
    }

    async fn upper_bound(
        &self,
        stream: &StreamKey,
        columns: &[Field],
    ) -> Result<Option<Vec<CursorValue>>> {
        let table = self.table(stream)?;
        let mut max: Option<Vec<CursorValue>> = None;
        for row in &table.rows {
            let Some(values) = ordering_values(row, columns)? else {
                continue;
            };
            let larger = max
                .as_ref()
                .is_none_or(|m| compare_tuples(&values, m) == Some(Ordering::Greater));
            if larger {
                max = Some(values);
            }
        }
        Ok(max)
    }

    async fn estimate_size(&self, stream: &StreamKey) -> Result<TableSizeEstimate> {
        let table = self.table(stream)?;
        let byte_size = table
            .rows
            .iter()
            .map(|row| serde_json::to_vec(row).map_or(0, |bytes| bytes.len() as u64))
            .sum();
        Ok(TableSizeEstimate {
            row_count: table.rows.len() as u64,
            byte_size,
        })
    }
}
