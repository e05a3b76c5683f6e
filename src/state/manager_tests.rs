//! Tests for StateManager

use super::*;
use crate::catalog::{Field, FieldType};
use crate::value::CursorValue;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;

fn users() -> Key {
    Key::Stream(StreamKey::new("users"))
}

fn ongoing(id: i64) -> State {
    State::Snapshot(SnapshotState::Ongoing {
        checkpoint: Checkpoint::new(
            vec![Field::new("id", FieldType::Integer)],
            vec![CursorValue::Integer(id)],
        ),
    })
}

fn log_at(position: &str) -> State {
    State::CdcLog(CdcLogState::Ongoing {
        offset: json!({ "position": position }),
    })
}

fn snapshot_manager() -> StateManager {
    StateManager::new([(users(), State::Snapshot(SnapshotState::NotStarted))]).unwrap()
}

fn cdc_manager(streams: &[&str]) -> (StateManager, GlobalKey) {
    let global = GlobalKey::new(streams.iter().map(|s| StreamKey::new(*s)));
    let mut initial: Vec<(Key, State)> = streams
        .iter()
        .map(|s| {
            (
                Key::Stream(StreamKey::new(*s)),
                State::CdcSnapshot(CdcSnapshotState::NotStarted),
            )
        })
        .collect();
    initial.push((Key::Global(global.clone()), log_at("0/1")));
    (StateManager::new(initial).unwrap(), global)
}

// ============================================================================
// Construction Tests
// ============================================================================

#[test]
fn test_rejects_duplicate_keys() {
    let result = StateManager::new([
        (users(), State::Snapshot(SnapshotState::NotStarted)),
        (users(), State::Snapshot(SnapshotState::NotStarted)),
    ]);
    assert!(result.is_err());
}

#[test]
fn test_rejects_global_with_unknown_stream() {
    let global = GlobalKey::new([StreamKey::new("missing")]);
    let result = StateManager::new([(Key::Global(global), log_at("0/1"))]);
    assert!(result.is_err());
}

#[test]
fn test_unknown_key_is_an_error() {
    let manager = snapshot_manager();
    let other = Key::Stream(StreamKey::new("orders"));
    assert!(manager.set(&other, ongoing(1), 1).is_err());
    assert!(manager.current(&other).is_err());
}

// ============================================================================
// Checkpoint Tests
// ============================================================================

#[test]
fn test_checkpoint_is_idempotent() {
    let manager = snapshot_manager();
    manager.set(&users(), ongoing(10), 10).unwrap();

    let first = manager.checkpoint();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].record_count(), 10);

    assert!(manager.checkpoint().is_empty());
    assert!(manager.checkpoint().is_empty());
}

#[test]
fn test_counts_accumulate_until_checkpoint() {
    let manager = snapshot_manager();
    manager.set(&users(), ongoing(10), 10).unwrap();
    manager.set(&users(), ongoing(20), 5).unwrap();

    let messages = manager.checkpoint();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0],
        CheckpointMessage::Stream {
            stream: StreamKey::new("users"),
            state: ongoing(20).to_value().unwrap(),
            record_count: 15,
        }
    );
    assert_eq!(manager.current(&users()).unwrap(), ongoing(20));
}

#[test]
fn test_unchanged_state_with_rows_is_emitted() {
    let manager = snapshot_manager();
    manager.set(&users(), ongoing(10), 1).unwrap();
    manager.checkpoint();

    manager.add_records(&users(), 3).unwrap();
    let messages = manager.checkpoint();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].record_count(), 3);
}

#[test]
fn test_starting_state_is_never_emitted() {
    let manager = snapshot_manager();
    manager
        .set(
            &users(),
            State::Snapshot(SnapshotState::Starting { upper_bound: None }),
            0,
        )
        .unwrap();
    assert!(manager.checkpoint().is_empty());
    assert_eq!(
        manager.current(&users()).unwrap(),
        State::Snapshot(SnapshotState::NotStarted)
    );
}

#[test]
fn test_completed_is_terminal() {
    let manager = snapshot_manager();
    let completed = State::Snapshot(SnapshotState::Completed);
    manager.set(&users(), completed.clone(), 0).unwrap();
    manager.set(&users(), completed, 0).unwrap();

    let err = manager.set(&users(), ongoing(1), 0).unwrap_err();
    assert!(err.to_string().contains("already completed"));
}

#[test]
fn test_family_change_is_rejected() {
    let manager = snapshot_manager();
    let result = manager.set(&users(), State::Cursor(CursorState::NotStarted), 0);
    assert!(result.is_err());
}

#[test]
fn test_apply_rejects_stale_result() {
    let manager = snapshot_manager();
    let stale = WorkResult::new(ongoing(5), ongoing(6), 1);
    assert!(manager.apply(&users(), &stale).is_err());

    let fresh = WorkResult::new(State::Snapshot(SnapshotState::NotStarted), ongoing(6), 1);
    manager.apply(&users(), &fresh).unwrap();
    assert_eq!(manager.latest(&users()).unwrap(), ongoing(6));
}

// ============================================================================
// Global Rollup Tests
// ============================================================================

#[test]
fn test_nested_streams_only_emit_through_global() {
    let (manager, _) = cdc_manager(&["a", "b"]);
    let a = Key::Stream(StreamKey::new("a"));
    let done = State::CdcSnapshot(CdcSnapshotState::Completed);
    manager.set(&a, done, 4).unwrap();

    let messages = manager.checkpoint();
    assert_eq!(messages.len(), 1);
    let CheckpointMessage::Global {
        shared_state,
        stream_states,
        record_count,
    } = &messages[0]
    else {
        panic!("expected a global checkpoint");
    };
    assert_eq!(shared_state, &json!({"position": "0/1"}));
    assert_eq!(*record_count, 4);
    assert_eq!(
        stream_states,
        &vec![StreamStateEntry {
            stream: StreamKey::new("a"),
            state: StateValue::SnapshotCompleted,
        }]
    );
}

#[test]
fn test_global_emitted_only_on_progress() {
    let (manager, global) = cdc_manager(&["a"]);
    let key = Key::Global(global.clone());

    assert!(manager.checkpoint().is_empty());

    let result = WorkResult::new(log_at("0/1"), log_at("0/2"), 0);
    manager.apply_global(&global, &result, &HashMap::new()).unwrap();
    let messages = manager.checkpoint();
    assert_eq!(messages.len(), 1);
    assert_eq!(manager.current(&key).unwrap(), log_at("0/2"));

    assert!(manager.checkpoint().is_empty());
}

#[test]
fn test_apply_global_sums_nested_counts() {
    let (manager, global) = cdc_manager(&["a", "b"]);
    let counts = HashMap::from([(StreamKey::new("a"), 3), (StreamKey::new("b"), 4)]);
    let result = WorkResult::new(log_at("0/1"), log_at("0/9"), 7);
    manager.apply_global(&global, &result, &counts).unwrap();

    let messages = manager.checkpoint();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].record_count(), 14);
}

#[test]
fn test_apply_global_rejects_foreign_stream() {
    let (manager, global) = cdc_manager(&["a"]);
    let counts = HashMap::from([(StreamKey::new("z"), 1)]);
    let result = WorkResult::new(log_at("0/1"), log_at("0/2"), 1);
    assert!(manager.apply_global(&global, &result, &counts).is_err());
    assert_eq!(
        manager.latest(&Key::Global(global)).unwrap(),
        log_at("0/1")
    );
}

#[test]
fn test_concurrent_updates_sum_exactly() {
    let names: Vec<String> = (0..8).map(|i| format!("s{i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let (manager, _) = cdc_manager(&refs);

    let per_thread = 500;
    let mut emitted = 0u64;
    std::thread::scope(|scope| {
        let checkpointer = scope.spawn(|| {
            let mut total = 0u64;
            for _ in 0..200 {
                total += manager
                    .checkpoint()
                    .iter()
                    .map(CheckpointMessage::record_count)
                    .sum::<u64>();
                std::thread::yield_now();
            }
            total
        });

        let workers: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let manager = &manager;
                scope.spawn(move || {
                    let key = Key::Stream(StreamKey::new(name.as_str()));
                    for step in 0..per_thread {
                        let state = State::CdcSnapshot(CdcSnapshotState::Ongoing {
                            checkpoint: Checkpoint::new(
                                vec![Field::new("id", FieldType::Integer)],
                                vec![CursorValue::Integer(step)],
                            ),
                        });
                        manager.set(&key, state, (i as u64) + 1).unwrap();
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        emitted += checkpointer.join().unwrap();
    });

    emitted += manager
        .checkpoint()
        .iter()
        .map(CheckpointMessage::record_count)
        .sum::<u64>();

    let expected: u64 = (1..=8u64).map(|n| n * per_thread as u64).sum();
    assert_eq!(emitted, expected);
}
