//! DuckDB-backed query executor

use super::connection::{ConnectionConfig, SOURCE_CATALOG};
use super::sql;
use crate::catalog::{Field, FieldType};
use crate::error::{Error, Result};
use crate::source::{QueryExecutor, RowStream, SelectQuery, TableSizeEstimate};
use crate::state::StreamKey;
use crate::types::{JsonValue, Row};
use crate::value::CursorValue;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use duckdb::types::{TimeUnit, Value};
use duckdb::Connection;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Rows measured to estimate the average row size
const SIZE_SAMPLE_ROWS: u64 = 1_000;

/// Source database reached through DuckDB
pub struct DuckDbSource {
    conn: Mutex<Connection>,
    config: ConnectionConfig,
}

impl DuckDbSource {
    /// Open an in-memory DuckDB and attach the configured source
    pub fn connect(config: ConnectionConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::config(format!("Failed to create DuckDB connection: {e}")))?;
        config.attach(&conn)?;
        info!(kind = %config.kind, source = %config.connection_info(), "Connected to source");
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    /// Tables live in the DuckDB connection itself
    pub fn in_memory() -> Result<Self> {
        Self::connect(ConnectionConfig::default())
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Run statements directly against the DuckDB connection
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    /// Test the connection
    pub fn check_connection(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch("SELECT 1")
            .map_err(|e| Error::config(format!("Connection check failed: {e}")))
    }

    /// Attach name of the source, `None` when tables live in DuckDB itself
    fn catalog(&self) -> Option<&'static str> {
        (!self.config.is_in_process()).then_some(SOURCE_CATALOG)
    }

    fn table(&self, stream: &StreamKey) -> String {
        sql::table_name(stream, self.catalog(), self.config.kind.default_schema())
    }

    fn clone_connection(&self) -> Result<Connection> {
        Ok(self.conn.lock().try_clone()?)
    }

    /// Run blocking DuckDB work off the async runtime
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.clone_connection()?;
        tokio::task::spawn_blocking(move || f(&conn))
            .await
            .map_err(|e| Error::Other(format!("DuckDB task failed: {e}")))?
    }
}

/// Execute `query` and hand every row to `emit`, which returns false to stop
fn query_rows(
    conn: &Connection,
    query: &str,
    columns: &[Field],
    mut emit: impl FnMut(Row) -> bool,
) -> Result<()> {
    let mut stmt = conn.prepare(query)?;
    let mut rows = stmt.query([])?;
    let names: Vec<String> = match rows.as_ref() {
        Some(stmt) if columns.is_empty() => stmt.column_names(),
        _ => columns.iter().map(|c| c.name.clone()).collect(),
    };

    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (idx, name) in names.iter().enumerate() {
            let value: Value = row.get(idx)?;
            let field_type = columns.get(idx).map(|c| c.field_type);
            record.insert(name.clone(), value_to_json(value, field_type));
        }
        if !emit(record) {
            break;
        }
    }
    Ok(())
}

#[async_trait]
impl QueryExecutor for DuckDbSource {
    fn read(&self, query: SelectQuery, fetch_size: usize) -> RowStream<'_> {
        let sql = sql::select(&query, &self.table(&query.stream));
        debug!(stream = %query.stream, sql = %sql, "Executing query");

        let conn = match self.clone_connection() {
            Ok(conn) => conn,
            Err(e) => return stream::iter(std::iter::once(Err(e))).boxed(),
        };
        let (tx, rx) = mpsc::channel::<Result<Row>>(fetch_size.max(1));
        let stream_name = query.stream.to_string();
        tokio::task::spawn_blocking(move || {
            let sent = query_rows(&conn, &sql, &query.columns, |row| {
                tx.blocking_send(Ok(row)).is_ok()
            });
            if let Err(e) = sent {
                let _ = tx.blocking_send(Err(Error::query(stream_name, e.to_string())));
            }
        });

        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|row| (row, rx)) }).boxed()
    }

    async fn upper_bound(
        &self,
        stream: &StreamKey,
        columns: &[Field],
    ) -> Result<Option<Vec<CursorValue>>> {
        if columns.is_empty() {
            return Ok(None);
        }
        let query = sql::max_tuple(columns, &self.table(stream));
        let fields = columns.to_vec();
        let rows = self
            .blocking(move |conn| {
                let mut rows = Vec::new();
                query_rows(conn, &query, &fields, |row| {
                    rows.push(row);
                    false
                })?;
                Ok(rows)
            })
            .await?;

        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let mut values = Vec::with_capacity(columns.len());
        for column in columns {
            let raw = row.get(&column.name).unwrap_or(&JsonValue::Null);
            match CursorValue::from_json(column.field_type, raw)? {
                Some(value) => values.push(value),
                None => return Ok(None),
            }
        }
        Ok(Some(values))
    }

    async fn estimate_size(&self, stream: &StreamKey) -> Result<TableSizeEstimate> {
        let table = self.table(stream);
        let estimate = sql::estimated_rows(stream, self.catalog(), self.config.kind.default_schema());
        let stream_name = stream.to_string();
        self.blocking(move |conn| {
            let row_count = match catalog_row_count(conn, &estimate) {
                Some(rows) => rows,
                None => {
                    debug!(stream = %stream_name, "No catalog estimate, counting rows");
                    let rows: i64 = conn.query_row(
                        &format!("SELECT COUNT(*) FROM {table}"),
                        [],
                        |row| row.get(0),
                    )?;
                    u64::try_from(rows).unwrap_or(0)
                }
            };

            let mut sampled = 0u64;
            let mut sampled_bytes = 0u64;
            let query = format!("SELECT * FROM {table} LIMIT {SIZE_SAMPLE_ROWS}");
            query_rows(conn, &query, &[], |row| {
                sampled += 1;
                sampled_bytes += serde_json::to_vec(&row).map_or(0, |b| b.len() as u64);
                true
            })?;

            let byte_size = if sampled == 0 {
                0
            } else {
                sampled_bytes / sampled * row_count
            };
            Ok(TableSizeEstimate {
                row_count,
                byte_size,
            })
        })
        .await
    }
}

/// Positive row count from catalog statistics, if the source keeps any
fn catalog_row_count(conn: &Connection, query: &str) -> Option<u64> {
    let estimated: Option<i64> = conn
        .query_row(query, [], |row| row.get::<_, Option<i64>>(0))
        .ok()
        .flatten();
    estimated
        .and_then(|rows| u64::try_from(rows).ok())
        .filter(|rows| *rows > 0)
}

fn micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

/// Convert a DuckDB value to JSON, shaped for the column's type
fn value_to_json(value: Value, field_type: Option<FieldType>) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(b),
        Value::TinyInt(i) => JsonValue::from(i),
        Value::SmallInt(i) => JsonValue::from(i),
        Value::Int(i) => JsonValue::from(i),
        Value::BigInt(i) => JsonValue::from(i),
        Value::HugeInt(i) => JsonValue::String(i.to_string()),
        Value::UTinyInt(i) => JsonValue::from(i),
        Value::USmallInt(i) => JsonValue::from(i),
        Value::UInt(i) => JsonValue::from(i),
        Value::UBigInt(i) => JsonValue::from(i),
        Value::Float(f) => serde_json::Number::from_f64(f64::from(f))
            .map_or(JsonValue::Null, JsonValue::Number),
        Value::Double(f) => {
            serde_json::Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number)
        }
        Value::Text(s) => JsonValue::String(s),
        Value::Blob(b) => JsonValue::String(BASE64.encode(b)),
        Value::Timestamp(unit, i) => {
            let us = micros(unit, i);
            match chrono::DateTime::from_timestamp_micros(us) {
                Some(dt) if field_type == Some(FieldType::TimestampWithTimezone) => {
                    JsonValue::String(dt.format(crate::value::TIMESTAMP_TZ_FORMAT).to_string())
                }
                Some(dt) => JsonValue::String(
                    dt.naive_utc()
                        .format(crate::value::TIMESTAMP_FORMAT)
                        .to_string(),
                ),
                None => JsonValue::from(i),
            }
        }
        Value::Date32(d) => {
            // Days since the epoch; 719163 days separate 0001-01-01 and 1970-01-01
            chrono::NaiveDate::from_num_days_from_ce_opt(d + 719_163)
                .map_or(JsonValue::from(d), |date| {
                    JsonValue::String(date.format("%Y-%m-%d").to_string())
                })
        }
        Value::Time64(unit, t) => {
            let t = micros(unit, t);
            let secs = t / 1_000_000;
            let us = t % 1_000_000;
            JsonValue::String(format!(
                "{:02}:{:02}:{:02}.{:06}",
                secs / 3600,
                (secs % 3600) / 60,
                secs % 60,
                us
            ))
        }
        other => JsonValue::String(format!("{other:?}")),
    }
}
