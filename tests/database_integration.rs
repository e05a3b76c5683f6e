//! DuckDB executor integration tests
//!
//! The in-process tests run against an in-memory DuckDB. The PostgreSQL test
//! requires a live database; set POSTGRES_TEST_URL to run it.

use futures::TryStreamExt;
use pretty_assertions::assert_eq;
use solidafy_extract::catalog::{Field, FieldType, Stream};
use solidafy_extract::database::{ConnectionConfig, DuckDbSource, SourceKind};
use solidafy_extract::engine::{Message, SyncEngine};
use solidafy_extract::source::{QueryExecutor, SelectQuery};
use solidafy_extract::state::{PersistedState, StateValue, StreamKey};
use solidafy_extract::value::CursorValue;
use solidafy_extract::{ExtractConfig, Row, SyncMode};
use std::sync::Arc;
use tokio::sync::mpsc;

fn users() -> StreamKey {
    StreamKey::new("users")
}

fn id() -> Field {
    Field::new("id", FieldType::Integer)
}

fn updated_at() -> Field {
    Field::new("updated_at", FieldType::TimestampWithoutTimezone)
}

fn users_stream(sync_mode: SyncMode) -> Stream {
    Stream {
        key: users(),
        fields: vec![id(), Field::new("name", FieldType::String), updated_at()],
        primary_key: vec![id()],
        cursor: (sync_mode == SyncMode::Incremental).then(updated_at),
        sync_mode,
    }
}

fn source_with_users(count: u32) -> Arc<DuckDbSource> {
    let source = DuckDbSource::in_memory().unwrap();
    source
        .execute_batch(&format!(
            "CREATE TABLE users AS
             SELECT i AS id,
                    'user_' || i AS name,
                    TIMESTAMP '2024-01-01 00:00:00' + to_seconds(i) AS updated_at
             FROM range(1, {}) t(i);",
            count + 1
        ))
        .unwrap();
    Arc::new(source)
}

async fn sync(engine: &SyncEngine, persisted: &PersistedState) -> Vec<Message> {
    let (tx, mut rx) = mpsc::channel(256);
    let collect = async {
        let mut messages = Vec::new();
        while let Some(message) = rx.recv().await {
            messages.push(message);
        }
        messages
    };
    let (stats, messages) = tokio::join!(engine.read(persisted, tx), collect);
    assert!(stats.unwrap().is_success());
    messages
}

fn record_ids(messages: &[Message]) -> Vec<i64> {
    let mut ids: Vec<i64> = messages
        .iter()
        .filter_map(|m| match m {
            Message::Record { data, .. } => data["id"].as_i64(),
            _ => None,
        })
        .collect();
    ids.sort_unstable();
    ids
}

#[tokio::test]
async fn test_bounded_read_is_half_open_and_ordered() {
    let source = source_with_users(50);
    let query = SelectQuery::new(users(), vec![id(), updated_at()])
        .with_order_by(vec![id()])
        .with_bounds(
            Some(vec![CursorValue::Integer(10)]),
            Some(vec![CursorValue::Integer(20)]),
        );

    let rows: Vec<Row> = source.read(query, 4).try_collect().await.unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, (11..=20).collect::<Vec<_>>());
    assert_eq!(rows[0]["updated_at"], "2024-01-01T00:00:11.000000");
}

#[tokio::test]
async fn test_upper_bound_and_estimate() {
    let source = source_with_users(120);
    let max = source.upper_bound(&users(), &[updated_at()]).await.unwrap();
    assert_eq!(
        max,
        Some(vec![CursorValue::parse(
            FieldType::TimestampWithoutTimezone,
            "2024-01-01T00:02:00"
        )
        .unwrap()])
    );

    let estimate = source.estimate_size(&users()).await.unwrap();
    assert_eq!(estimate.row_count, 120);
    assert!(estimate.byte_size > 120 * 20);
}

#[tokio::test]
async fn test_missing_table_fails_the_read() {
    let source = DuckDbSource::in_memory().unwrap();
    let query = SelectQuery::new(users(), vec![id()]);
    let result: Result<Vec<Row>, _> = source.read(query, 10).try_collect().await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_split_snapshot_reads_every_row_once() {
    let source = source_with_users(2_000);
    let config = ExtractConfig::default()
        .with_target_partition_bytes(20_000)
        .with_max_sample_size(400);
    let engine = SyncEngine::new(source, config, vec![users_stream(SyncMode::FullRefresh)]).unwrap();

    let messages = sync(&engine, &PersistedState::new()).await;
    assert_eq!(record_ids(&messages), (1..=2_000).collect::<Vec<_>>());
    assert!(messages.last().unwrap().is_state());
}

#[tokio::test]
async fn test_cursor_sync_picks_up_new_rows() {
    let source = source_with_users(30);
    let engine = SyncEngine::new(
        source.clone(),
        ExtractConfig::default(),
        vec![users_stream(SyncMode::Incremental)],
    )
    .unwrap();

    let messages = sync(&engine, &PersistedState::new()).await;
    assert_eq!(record_ids(&messages).len(), 30);

    let mut persisted = PersistedState::new();
    for message in &messages {
        if let Message::State(checkpoint) = message {
            persisted.apply(checkpoint);
        }
    }
    assert!(matches!(
        persisted.stream_state(&users()),
        Some(StateValue::CursorBased { cursor: Some(_), .. })
    ));

    source
        .execute_batch(
            "INSERT INTO users VALUES
             (31, 'user_31', TIMESTAMP '2024-01-01 00:00:31'),
             (32, 'user_32', TIMESTAMP '2024-01-01 00:00:32');",
        )
        .unwrap();
    let messages = sync(&engine, &persisted).await;
    assert_eq!(record_ids(&messages), vec![31, 32]);
}

#[test]
fn test_postgres_connection() {
    let Ok(conn_str) = std::env::var("POSTGRES_TEST_URL") else {
        println!("Skipping: POSTGRES_TEST_URL not set");
        return;
    };

    let source = DuckDbSource::connect(ConnectionConfig::new(SourceKind::Postgres, conn_str));
    assert!(source.is_ok(), "Failed to connect: {:?}", source.err());
    let check = source.unwrap().check_connection();
    assert!(check.is_ok(), "Connection check failed: {:?}", check.err());
}
