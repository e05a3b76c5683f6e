//! Tests for catalog resolution

use super::*;
use crate::state::StreamKey;
use crate::types::{ReplicationMethod, SyncMode};
use pretty_assertions::assert_eq;

fn users() -> ConfiguredStream {
    ConfiguredStream::new(
        "users",
        vec![
            Field::new("id", FieldType::Integer),
            Field::new("name", FieldType::String),
            Field::new("updated_at", FieldType::TimestampWithoutTimezone),
            Field::new("payload", FieldType::Json),
        ],
    )
    .with_namespace("public")
}

#[test]
fn test_resolve_full_refresh_without_key() {
    let catalog = Catalog {
        streams: vec![users()],
    };
    let (streams, excluded) = catalog.resolve(ReplicationMethod::Standard);

    assert!(excluded.is_empty());
    assert_eq!(streams.len(), 1);
    assert!(!streams[0].has_primary_key());
    assert_eq!(streams[0].key, StreamKey::with_namespace("public", "users"));
}

#[test]
fn test_resolve_picks_first_valid_primary_key() {
    let stream = users()
        .with_primary_key(&["missing"])
        .with_primary_key(&["id"]);
    let catalog = Catalog {
        streams: vec![stream],
    };
    let (streams, excluded) = catalog.resolve(ReplicationMethod::Standard);

    assert!(excluded.is_empty());
    assert_eq!(streams[0].primary_key, vec![Field::new("id", FieldType::Integer)]);
}

#[test]
fn test_resolve_excludes_missing_primary_key_column() {
    let catalog = Catalog {
        streams: vec![users().with_primary_key(&["tenant", "id"])],
    };
    let (streams, excluded) = catalog.resolve(ReplicationMethod::Standard);

    assert!(streams.is_empty());
    assert_eq!(excluded.len(), 1);
    assert!(excluded[0].reason.contains("tenant"));
}

#[test]
fn test_resolve_excludes_incremental_without_cursor() {
    let catalog = Catalog {
        streams: vec![users()
            .with_primary_key(&["id"])
            .with_sync_mode(SyncMode::Incremental)],
    };
    let (streams, excluded) = catalog.resolve(ReplicationMethod::Standard);

    assert!(streams.is_empty());
    assert_eq!(excluded[0].reason, "incremental stream has no cursor field");

    let err: crate::Error = excluded[0].clone().into();
    assert!(matches!(err, crate::Error::StreamExcluded { .. }));
}

#[test]
fn test_resolve_excludes_missing_and_json_cursor() {
    let missing = users()
        .with_sync_mode(SyncMode::Incremental)
        .with_cursor("modified");
    let json = ConfiguredStream {
        name: "events".to_string(),
        ..users()
            .with_sync_mode(SyncMode::Incremental)
            .with_cursor("payload")
    };
    let catalog = Catalog {
        streams: vec![missing, json],
    };
    let (streams, excluded) = catalog.resolve(ReplicationMethod::Standard);

    assert!(streams.is_empty());
    assert_eq!(excluded.len(), 2);
    assert!(excluded[0].reason.contains("modified"));
    assert!(excluded[1].reason.contains("non-orderable"));
}

#[test]
fn test_resolve_cdc_ignores_cursor() {
    let catalog = Catalog {
        streams: vec![users()
            .with_primary_key(&["id"])
            .with_sync_mode(SyncMode::Incremental)],
    };
    let (streams, excluded) = catalog.resolve(ReplicationMethod::Cdc);

    assert!(excluded.is_empty());
    assert!(streams[0].cursor.is_none());
}

#[test]
fn test_resolve_excludes_duplicates() {
    let catalog = Catalog {
        streams: vec![users(), users()],
    };
    let (streams, excluded) = catalog.resolve(ReplicationMethod::Standard);

    assert_eq!(streams.len(), 1);
    assert_eq!(excluded[0].reason, "duplicate stream in catalog");
}

#[test]
fn test_catalog_from_yaml() {
    let yaml = r"
streams:
  - name: orders
    namespace: sales
    fields:
      - { name: id, type: integer }
      - { name: updated_at, type: timestamp_with_timezone }
    primary_key: [[id]]
    cursor_field: updated_at
    sync_mode: incremental
";
    let catalog = Catalog::from_yaml_str(yaml).unwrap();
    let (streams, excluded) = catalog.resolve(ReplicationMethod::Standard);

    assert!(excluded.is_empty());
    let orders = &streams[0];
    assert_eq!(orders.sync_mode, SyncMode::Incremental);
    assert_eq!(
        orders.cursor,
        Some(Field::new("updated_at", FieldType::TimestampWithTimezone))
    );
    assert_eq!(orders.field("id").map(|f| f.field_type), Some(FieldType::Integer));
}

#[test]
fn test_field_type_capabilities() {
    assert!(FieldType::Integer.is_splittable());
    assert!(FieldType::TimestampWithTimezone.is_splittable());
    assert!(!FieldType::Boolean.is_splittable());
    assert!(!FieldType::Binary.is_splittable());
    assert!(FieldType::Binary.is_orderable());
    assert!(!FieldType::Json.is_orderable());
}
