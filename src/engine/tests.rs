//! Tests for engine module

use super::*;
use crate::catalog::{Field, FieldType};
use crate::cdc::{ChangeOp, LogFeed, MemoryChangeLog};
use crate::error::CdcRecovery;
use crate::source::MemorySource;
use crate::state::{
    CheckpointMessage, CursorState, SnapshotState, StateValue, StreamKey, StreamStateEntry,
};
use crate::types::{
    InvalidCdcPositionBehavior, LogLevel, OpaqueStateValue, ReplicationMethod, Row, SyncMode,
};
use crate::value::CursorValue;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;

// ============================================================================
// Helpers
// ============================================================================

fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().unwrap()
}

fn users() -> StreamKey {
    StreamKey::new("users")
}

fn orders() -> StreamKey {
    StreamKey::new("orders")
}

fn id() -> Field {
    Field::new("id", FieldType::Integer)
}

fn updated_at() -> Field {
    Field::new("updated_at", FieldType::TimestampWithoutTimezone)
}

fn stream(key: StreamKey, sync_mode: SyncMode) -> Stream {
    Stream {
        key,
        fields: vec![id(), Field::new("name", FieldType::String), updated_at()],
        primary_key: vec![id()],
        cursor: (sync_mode == SyncMode::Incremental).then(updated_at),
        sync_mode,
    }
}

fn rows(count: i64) -> Vec<Row> {
    (1..=count)
        .map(|i| {
            row(json!({
                "id": i,
                "name": format!("row_{i}"),
                "updated_at": format!("2024-01-01T00:{:02}:{:02}", (i / 60) % 60, i % 60),
            }))
        })
        .collect()
}

fn ts(s: &str) -> CursorValue {
    CursorValue::parse(FieldType::TimestampWithoutTimezone, s).unwrap()
}

async fn collect(mut rx: mpsc::Receiver<Message>) -> Vec<Message> {
    let mut messages = Vec::new();
    while let Some(message) = rx.recv().await {
        messages.push(message);
    }
    messages
}

async fn sync(engine: &SyncEngine, persisted: &PersistedState) -> (Result<SyncStats>, Vec<Message>) {
    let (tx, rx) = mpsc::channel(64);
    tokio::join!(engine.read(persisted, tx), collect(rx))
}

fn records_of<'a>(messages: &'a [Message], key: &StreamKey) -> Vec<&'a Row> {
    messages
        .iter()
        .filter_map(|m| match m {
            Message::Record { stream, data, .. } if stream == key => Some(data),
            _ => None,
        })
        .collect()
}

fn checkpoints(messages: &[Message]) -> Vec<&CheckpointMessage> {
    messages
        .iter()
        .filter_map(|m| match m {
            Message::State(checkpoint) => Some(checkpoint),
            _ => None,
        })
        .collect()
}

fn persist(messages: &[Message]) -> PersistedState {
    let mut persisted = PersistedState::new();
    for checkpoint in checkpoints(messages) {
        persisted.apply(checkpoint);
    }
    persisted
}

fn ids(records: &[&Row]) -> Vec<i64> {
    let mut ids: Vec<i64> = records.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    ids.sort_unstable();
    ids
}

// ============================================================================
// Message Tests
// ============================================================================

#[test]
fn test_message_predicates() {
    let msg = Message::record(users(), row(json!({"id": 1})));
    assert!(msg.is_record());
    assert!(!msg.is_state());
    assert!(!msg.is_log());

    let msg = Message::warn("warning");
    assert!(msg.is_log());
    assert!(!msg.is_record());
}

#[test]
fn test_message_json() {
    let msg = Message::record(StreamKey::with_namespace("public", "users"), row(json!({"id": 1})));
    let value = msg.to_json();
    assert_eq!(value["type"], "RECORD");
    assert_eq!(value["record"]["namespace"], "public");
    assert_eq!(value["record"]["stream"], "users");
    assert_eq!(value["record"]["data"], json!({"id": 1}));

    let value = Message::log(LogLevel::Error, "boom").to_json();
    assert_eq!(value["type"], "LOG");
    assert_eq!(value["log"]["level"], "ERROR");

    let value = Message::State(CheckpointMessage::Stream {
        stream: users(),
        state: StateValue::SnapshotCompleted,
        record_count: 3,
    })
    .to_json();
    assert_eq!(value["type"], "STATE");
    assert_eq!(value["state"]["type"], "stream");
    assert_eq!(value["state"]["record_count"], 3);
}

// ============================================================================
// SyncStats Tests
// ============================================================================

#[test]
fn test_sync_stats_merge() {
    let mut stats = SyncStats::new();
    assert!(stats.is_success());

    let mut other = SyncStats::new();
    other.records_synced = 10;
    other.partitions_read = 2;
    other.add_failure("orders", "timeout");
    stats.merge(other);

    assert_eq!(stats.records_synced, 10);
    assert_eq!(stats.partitions_read, 2);
    assert!(!stats.is_success());
    assert_eq!(stats.failures[0].0, "orders");
}

// ============================================================================
// Worker Tests
// ============================================================================

#[tokio::test]
async fn test_soft_timeout_cancels_child_only() {
    let parent = CancellationToken::new();
    let (token, timer) = soft_timeout(&parent, std::time::Duration::from_millis(10));
    timer.await.unwrap();
    assert!(token.is_cancelled());
    assert!(!parent.is_cancelled());

    let (token, timer) = soft_timeout(&parent, std::time::Duration::from_secs(3600));
    parent.cancel();
    assert!(token.is_cancelled());
    timer.abort();
}

#[tokio::test]
async fn test_stopped_worker_resumes_without_loss_or_duplication() {
    let source = Arc::new(MemorySource::new());
    source.add_table(users(), rows(25));
    let factory = PartitionFactory::new(source.clone());
    let (tx, rx) = mpsc::channel(100);
    let worker = PartitionWorker::new(source.clone(), tx);

    let stream = stream(users(), SyncMode::FullRefresh);
    let partition = factory
        .create(&stream, &State::Snapshot(SnapshotState::NotStarted))
        .await
        .unwrap()
        .unwrap();

    let stopped = CancellationToken::new();
    stopped.cancel();
    let first = worker
        .run(&partition, partition.starting_state(), 10, &stopped)
        .await
        .unwrap();
    assert_eq!(first.result.record_count, 10);
    let State::Snapshot(SnapshotState::Ongoing { checkpoint }) = &first.result.output else {
        panic!("expected an ongoing snapshot, got {:?}", first.result.output);
    };
    assert_eq!(checkpoint.values, vec![CursorValue::Integer(10)]);

    let remainder = first.remainder.unwrap();
    let second = worker
        .run(&remainder, remainder.starting_state(), 10, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.result.record_count, 15);
    assert_eq!(second.result.output, State::Snapshot(SnapshotState::Completed));
    assert!(second.remainder.is_none());

    drop(worker);
    let messages = collect(rx).await;
    let records = records_of(&messages, &users());
    assert_eq!(ids(&records), (1..=25).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_stopped_cursor_read_finishes_its_cursor_value() {
    // Three rows share each timestamp
    let table: Vec<Row> = (1..=30)
        .map(|i| {
            row(json!({
                "id": i,
                "name": format!("row_{i}"),
                "updated_at": format!("2024-01-01T00:00:{:02}", (i + 2) / 3),
            }))
        })
        .collect();
    let source = Arc::new(MemorySource::new());
    source.add_table(users(), table);
    let factory = PartitionFactory::new(source.clone());
    let (tx, rx) = mpsc::channel(100);
    let worker = PartitionWorker::new(source.clone(), tx);

    let stream = stream(users(), SyncMode::Incremental);
    let state = State::Cursor(CursorState::Ongoing {
        cursor: updated_at(),
        value: ts("2023-12-31T00:00:00"),
    });
    let partition = factory.create(&stream, &state).await.unwrap().unwrap();
    assert!(!partition.has_unique_ordering());

    let stopped = CancellationToken::new();
    stopped.cancel();
    let first = worker
        .run(&partition, partition.starting_state(), 10, &stopped)
        .await
        .unwrap();
    // Rows 11 and 12 share the timestamp of row 10
    assert_eq!(first.result.record_count, 12);
    assert_eq!(
        first.result.output,
        State::Cursor(CursorState::Ongoing {
            cursor: updated_at(),
            value: ts("2024-01-01T00:00:04"),
        })
    );

    let remainder = first.remainder.unwrap();
    let second = worker
        .run(&remainder, remainder.starting_state(), 10, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.result.record_count, 18);
    assert!(second.result.output.is_terminal());

    drop(worker);
    let messages = collect(rx).await;
    let records = records_of(&messages, &users());
    assert_eq!(ids(&records), (1..=30).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_worker_reads_non_resumable_partition_to_the_end() {
    let source = Arc::new(MemorySource::new());
    source.add_table(users(), rows(25));
    let factory = PartitionFactory::new(source.clone());
    let (tx, _rx) = mpsc::channel(100);
    let worker = PartitionWorker::new(source.clone(), tx);

    let mut stream = stream(users(), SyncMode::FullRefresh);
    stream.primary_key.clear();
    let partition = factory
        .create(&stream, &State::Snapshot(SnapshotState::NotStarted))
        .await
        .unwrap()
        .unwrap();

    let stopped = CancellationToken::new();
    stopped.cancel();
    let outcome = worker
        .run(&partition, partition.starting_state(), 5, &stopped)
        .await
        .unwrap();
    assert_eq!(outcome.result.record_count, 25);
    assert_eq!(outcome.result.output, State::Snapshot(SnapshotState::Completed));
}

// ============================================================================
// Engine Tests
// ============================================================================

#[tokio::test]
async fn test_full_refresh_end_to_end() {
    let source = Arc::new(MemorySource::new());
    source.add_table(users(), rows(250));
    source.add_table(orders(), rows(40));
    let engine = SyncEngine::new(
        source,
        ExtractConfig::default().with_default_fetch_size(50),
        vec![
            stream(users(), SyncMode::FullRefresh),
            stream(orders(), SyncMode::FullRefresh),
        ],
    )
    .unwrap();

    let (stats, messages) = sync(&engine, &PersistedState::new()).await;
    let stats = stats.unwrap();
    assert!(stats.is_success());
    assert_eq!(stats.records_synced, 290);
    assert_eq!(stats.keys_completed, 2);

    assert_eq!(ids(&records_of(&messages, &users())), (1..=250).collect::<Vec<_>>());
    let persisted = persist(&messages);
    assert_eq!(persisted.stream_state(&users()), Some(&StateValue::SnapshotCompleted));
    assert_eq!(persisted.stream_state(&orders()), Some(&StateValue::SnapshotCompleted));
}

#[tokio::test]
async fn test_checkpoint_follows_its_records() {
    let source = Arc::new(MemorySource::new());
    source.add_table(users(), rows(120));
    let engine = SyncEngine::new(
        source,
        ExtractConfig::default(),
        vec![stream(users(), SyncMode::FullRefresh)],
    )
    .unwrap();

    let (stats, messages) = sync(&engine, &PersistedState::new()).await;
    stats.unwrap();

    let mut unaccounted = 0u64;
    for message in &messages {
        match message {
            Message::Record { .. } => unaccounted += 1,
            Message::State(checkpoint) => {
                assert_eq!(checkpoint.record_count(), unaccounted);
                unaccounted = 0;
            }
            Message::Log { .. } => {}
        }
    }
    assert_eq!(unaccounted, 0);
    assert!(messages.last().unwrap().is_state());
}

/// Executor that yields to the scheduler before every row and probe
struct YieldingSource(Arc<MemorySource>);

#[async_trait::async_trait]
impl QueryExecutor for YieldingSource {
    fn read(&self, query: crate::source::SelectQuery, fetch_size: usize) -> crate::source::RowStream<'_> {
        use futures::StreamExt;
        self.0
            .read(query, fetch_size)
            .then(|row| async move {
                tokio::task::yield_now().await;
                row
            })
            .boxed()
    }

    async fn upper_bound(
        &self,
        stream: &StreamKey,
        columns: &[Field],
    ) -> Result<Option<Vec<CursorValue>>> {
        tokio::task::yield_now().await;
        self.0.upper_bound(stream, columns).await
    }

    async fn estimate_size(&self, stream: &StreamKey) -> Result<crate::source::TableSizeEstimate> {
        tokio::task::yield_now().await;
        self.0.estimate_size(stream).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_checkpoints_of_a_stream_never_go_backwards() {
    let source = Arc::new(MemorySource::with_seed(3));
    let keys: Vec<StreamKey> = (0..8).map(|i| StreamKey::new(format!("t{i}"))).collect();
    for key in &keys {
        source.add_table(key.clone(), rows(300));
    }
    let config = ExtractConfig::default()
        .with_max_concurrency(8)
        .with_target_partition_bytes(2_000)
        .with_max_sample_size(150);
    let streams = keys.iter().map(|k| stream(k.clone(), SyncMode::FullRefresh)).collect();
    let engine = SyncEngine::new(Arc::new(YieldingSource(source)), config, streams).unwrap();

    for _ in 0..5 {
        let (tx, mut rx) = mpsc::channel(1);
        let consume = async {
            let mut messages = Vec::new();
            while let Some(message) = rx.recv().await {
                tokio::task::yield_now().await;
                messages.push(message);
            }
            messages
        };
        let initial = PersistedState::new();
        let (stats, messages) = tokio::join!(engine.read(&initial, tx), consume);
        assert!(stats.unwrap().is_success());

        let mut last: HashMap<StreamKey, Option<i64>> = HashMap::new();
        for checkpoint in checkpoints(&messages) {
            let CheckpointMessage::Stream { stream, state, .. } = checkpoint else {
                panic!("unexpected global checkpoint");
            };
            let position = match state {
                StateValue::PrimaryKey { pk_val, .. } => Some(pk_val[0].parse::<i64>().unwrap()),
                StateValue::SnapshotCompleted => None,
                other => panic!("unexpected state {other:?}"),
            };
            if let Some(previous) = last.get(stream) {
                let went_back = match (previous, position) {
                    (None, _) => true,
                    (Some(before), Some(now)) => now <= *before,
                    (Some(_), None) => false,
                };
                assert!(!went_back, "{stream} went from {previous:?} to {position:?}");
            }
            last.insert(stream.clone(), position);
        }

        let persisted = persist(&messages);
        for key in &keys {
            assert_eq!(persisted.stream_state(key), Some(&StateValue::SnapshotCompleted));
        }
    }
}

#[tokio::test]
async fn test_failing_stream_does_not_stop_others() {
    let source = Arc::new(MemorySource::new());
    source.add_table(users(), rows(30));
    source.add_table(orders(), rows(30));
    source.fail_reads(orders());
    let engine = SyncEngine::new(
        source,
        ExtractConfig::default().with_max_concurrency(1),
        vec![
            stream(orders(), SyncMode::FullRefresh),
            stream(users(), SyncMode::FullRefresh),
        ],
    )
    .unwrap();

    let (stats, messages) = sync(&engine, &PersistedState::new()).await;
    let stats = stats.unwrap();
    assert!(!stats.is_success());
    assert_eq!(stats.failures.len(), 1);
    assert_eq!(stats.failures[0].0, "orders");
    assert_eq!(records_of(&messages, &users()).len(), 30);
    assert!(messages.iter().any(|m| matches!(
        m,
        Message::Log { level: LogLevel::Error, message } if message.starts_with("orders")
    )));
}

#[tokio::test]
async fn test_cursor_stream_reads_only_new_rows_next_sync() {
    let source = Arc::new(MemorySource::new());
    source.add_table(users(), rows(60));
    let engine = SyncEngine::new(
        source.clone(),
        ExtractConfig::default(),
        vec![stream(users(), SyncMode::Incremental)],
    )
    .unwrap();

    let (stats, messages) = sync(&engine, &PersistedState::new()).await;
    stats.unwrap();
    assert_eq!(records_of(&messages, &users()).len(), 60);
    let persisted = persist(&messages);
    assert_eq!(
        persisted.stream_state(&users()),
        Some(&StateValue::CursorBased {
            cursor_field: "updated_at".into(),
            cursor: Some(ts("2024-01-01T00:01:00").to_string()),
        })
    );

    source.insert_rows(&users(), rows(65).into_iter().skip(60));
    let (stats, messages) = sync(&engine, &persisted).await;
    stats.unwrap();
    assert_eq!(ids(&records_of(&messages, &users())), vec![61, 62, 63, 64, 65]);
}

#[tokio::test]
async fn test_resume_from_interrupted_snapshot() {
    let source = Arc::new(MemorySource::new());
    source.add_table(users(), rows(50));
    let engine = SyncEngine::new(
        source,
        ExtractConfig::default(),
        vec![stream(users(), SyncMode::FullRefresh)],
    )
    .unwrap();

    let persisted = PersistedState {
        streams: vec![StreamStateEntry {
            stream: users(),
            state: StateValue::PrimaryKey {
                pk_name: vec!["id".into()],
                pk_val: vec!["20".into()],
                cursor_field: None,
                cursor: None,
            },
        }],
        global: None,
    };
    let (stats, messages) = sync(&engine, &persisted).await;
    stats.unwrap();
    assert_eq!(ids(&records_of(&messages, &users())), (21..=50).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_shutdown_before_read_emits_nothing() {
    let source = Arc::new(MemorySource::new());
    source.add_table(users(), rows(10));
    let engine = SyncEngine::new(
        source,
        ExtractConfig::default(),
        vec![stream(users(), SyncMode::FullRefresh)],
    )
    .unwrap();
    engine.shutdown_token().cancel();

    let (stats, messages) = sync(&engine, &PersistedState::new()).await;
    let stats = stats.unwrap();
    assert!(stats.is_success());
    assert_eq!(stats.keys_completed, 0);
    assert!(messages.is_empty());
}

// ============================================================================
// CDC Engine Tests
// ============================================================================

fn cdc_engine(
    source: &Arc<MemorySource>,
    log: &Arc<MemoryChangeLog>,
    behavior: InvalidCdcPositionBehavior,
) -> SyncEngine {
    let config = ExtractConfig::default()
        .with_replication(ReplicationMethod::Cdc)
        .with_invalid_cdc_position_behavior(behavior);
    let feed = LogFeed::new(log.clone(), GlobalKey::new([users(), orders()]), behavior);
    SyncEngine::new(
        source.clone(),
        config,
        vec![
            stream(users(), SyncMode::Incremental),
            stream(orders(), SyncMode::Incremental),
        ],
    )
    .unwrap()
    .with_cdc(Arc::new(feed))
}

fn global_checkpoint(messages: &[Message]) -> (&OpaqueStateValue, u64) {
    checkpoints(messages)
        .into_iter()
        .rev()
        .find_map(|c| match c {
            CheckpointMessage::Global {
                shared_state,
                record_count,
                ..
            } => Some((shared_state, *record_count)),
            CheckpointMessage::Stream { .. } => None,
        })
        .unwrap()
}

#[tokio::test]
async fn test_cdc_snapshot_then_change_log() {
    let source = Arc::new(MemorySource::new());
    source.add_table(users(), rows(20));
    source.add_table(orders(), rows(5));
    let log = Arc::new(MemoryChangeLog::new());
    let engine = cdc_engine(&source, &log, InvalidCdcPositionBehavior::FailSync);

    let (stats, messages) = sync(&engine, &PersistedState::new()).await;
    assert!(stats.unwrap().is_success());
    assert_eq!(records_of(&messages, &users()).len(), 20);
    assert!(checkpoints(&messages)
        .iter()
        .all(|c| matches!(c, CheckpointMessage::Global { .. })));
    let persisted = persist(&messages);
    assert_eq!(persisted.stream_state(&users()), Some(&StateValue::SnapshotCompleted));
    assert!(persisted.shared_state().is_some());

    log.append(users(), ChangeOp::Insert, row(json!({"id": 21})));
    log.append_transaction([
        (orders(), ChangeOp::Update, row(json!({"id": 2}))),
        (StreamKey::new("audit"), ChangeOp::Insert, row(json!({"id": 1}))),
    ]);

    let (stats, messages) = sync(&engine, &persisted).await;
    let stats = stats.unwrap();
    assert!(stats.is_success());
    assert_eq!(stats.records_synced, 2);
    assert_eq!(ids(&records_of(&messages, &users())), vec![21]);
    assert_eq!(ids(&records_of(&messages, &orders())), vec![2]);

    let (shared_state, record_count) = global_checkpoint(&messages);
    assert_eq!(record_count, 2);
    assert_eq!(shared_state, &crate::cdc::CdcOffset::new(log.head()).to_value());
}

#[tokio::test]
async fn test_purged_offset_fails_sync() {
    let source = Arc::new(MemorySource::new());
    source.add_table(users(), rows(3));
    source.add_table(orders(), rows(3));
    let log = Arc::new(MemoryChangeLog::new());
    let engine = cdc_engine(&source, &log, InvalidCdcPositionBehavior::FailSync);

    let (_, messages) = sync(&engine, &PersistedState::new()).await;
    let persisted = persist(&messages);
    log.append(users(), ChangeOp::Insert, row(json!({"id": 4})));
    log.purge_before(log.head());

    let (stats, _) = sync(&engine, &persisted).await;
    assert!(matches!(
        stats,
        Err(Error::InvalidCdcPosition {
            recovery: CdcRecovery::ManualReset,
            ..
        })
    ));
}

#[tokio::test]
async fn test_purged_offset_resyncs_nested_streams() {
    let source = Arc::new(MemorySource::new());
    source.add_table(users(), rows(3));
    source.add_table(orders(), rows(2));
    let log = Arc::new(MemoryChangeLog::new());
    let engine = cdc_engine(&source, &log, InvalidCdcPositionBehavior::ResetSync);

    let (_, messages) = sync(&engine, &PersistedState::new()).await;
    let persisted = persist(&messages);
    log.append(users(), ChangeOp::Insert, row(json!({"id": 4})));
    log.purge_before(log.head());

    let (stats, messages) = sync(&engine, &persisted).await;
    assert!(stats.unwrap().is_success());
    assert!(messages.iter().any(|m| matches!(
        m,
        Message::Log { level: LogLevel::Warn, .. }
    )));
    assert_eq!(ids(&records_of(&messages, &users())), vec![1, 2, 3]);
    assert_eq!(ids(&records_of(&messages, &orders())), vec![1, 2]);

    let (shared_state, _) = global_checkpoint(&messages);
    assert_eq!(shared_state, &crate::cdc::CdcOffset::new(log.head()).to_value());
    let persisted = persist(&messages);
    assert_eq!(persisted.stream_state(&orders()), Some(&StateValue::SnapshotCompleted));
}

#[tokio::test]
async fn test_cdc_without_feed_is_a_config_error() {
    let source = Arc::new(MemorySource::new());
    source.add_table(users(), rows(3));
    let engine = SyncEngine::new(
        source,
        ExtractConfig::default().with_replication(ReplicationMethod::Cdc),
        vec![stream(users(), SyncMode::Incremental)],
    )
    .unwrap();

    let (stats, messages) = sync(&engine, &PersistedState::new()).await;
    assert!(matches!(stats, Err(Error::Config { .. })));
    assert!(messages.is_empty());
}

#[tokio::test]
async fn test_full_refresh_stream_beside_cdc_streams_is_standalone() {
    let source = Arc::new(MemorySource::new());
    source.add_table(users(), rows(3));
    source.add_table(orders(), rows(3));
    let log = Arc::new(MemoryChangeLog::new());
    let feed = LogFeed::new(
        log.clone(),
        GlobalKey::new([users()]),
        InvalidCdcPositionBehavior::FailSync,
    );
    let engine = SyncEngine::new(
        source,
        ExtractConfig::default().with_replication(ReplicationMethod::Cdc),
        vec![
            stream(users(), SyncMode::Incremental),
            stream(orders(), SyncMode::FullRefresh),
        ],
    )
    .unwrap()
    .with_cdc(Arc::new(feed));

    let (stats, messages) = sync(&engine, &PersistedState::new()).await;
    assert!(stats.unwrap().is_success());
    assert!(checkpoints(&messages).iter().any(|c| matches!(
        c,
        CheckpointMessage::Stream { stream, .. } if stream == &orders()
    )));
    let persisted = persist(&messages);
    assert_eq!(persisted.global.as_ref().unwrap().stream_states.len(), 1);
    assert_eq!(persisted.stream_state(&users()), Some(&StateValue::SnapshotCompleted));
}
