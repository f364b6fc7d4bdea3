//! Integration tests for ndjson export/import.

use memori::{export_ndjson, import_ndjson, Config, InsertOptions, Memori};
use serde_json::json;
use std::io::Cursor;
use tempfile::tempdir;

fn open_db() -> (Memori, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let db = Memori::open(&path, Config::default()).unwrap();
    (db, dir)
}

#[test]
fn test_export_then_import_preserves_content_and_metadata() {
    let (source, _dir) = open_db();
    source
        .insert(
            "remember the kafka incident",
            json!({"type": "fact", "tags": ["ops"]}),
            InsertOptions { no_embed: true, ..Default::default() },
        )
        .unwrap();
    source
        .insert(
            "a preference note",
            json!({"type": "preference"}),
            InsertOptions { vector: Some(vec![1.0, 0.0, 0.0]), ..Default::default() },
        )
        .unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));

    let source_rows = source.list(memori::ListSort::Created, 10, 0, None, None, None, false).unwrap();

    let mut buf = Vec::new();
    let written = export_ndjson(&source, &mut buf, None).unwrap();
    assert_eq!(written, 2);

    let (dest, _dir2) = open_db();
    let mut cursor = Cursor::new(buf);
    let summary = import_ndjson(&dest, &mut cursor, false).unwrap();
    assert_eq!(summary.imported, 2);
    assert!(summary.errors.is_empty());
    assert_eq!(dest.count(None).unwrap(), 2);

    let listed = dest.list(memori::ListSort::Created, 10, 0, Some("preference"), None, None, true).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].vector, Some(vec![1.0, 0.0, 0.0]));

    // Round-trip must preserve created_at/updated_at field-for-field, not
    // restamp them at import time.
    let dest_rows = dest.list(memori::ListSort::Created, 10, 0, None, None, None, false).unwrap();
    assert_eq!(dest_rows.len(), source_rows.len());
    for (src, dst) in source_rows.iter().zip(dest_rows.iter()) {
        assert_eq!(src.id, dst.id);
        assert_eq!(src.created_at, dst.created_at);
        assert_eq!(src.updated_at, dst.updated_at);
    }
}

#[test]
fn test_export_with_type_filter_only_includes_matching_rows() {
    let (source, _dir) = open_db();
    source.insert("a fact", json!({"type": "fact"}), InsertOptions { no_embed: true, ..Default::default() }).unwrap();
    source.insert("a preference", json!({"type": "preference"}), InsertOptions { no_embed: true, ..Default::default() }).unwrap();

    let mut buf = Vec::new();
    let written = export_ndjson(&source, &mut buf, Some("fact")).unwrap();
    assert_eq!(written, 1);
}

#[test]
fn test_import_new_ids_discards_original_ids() {
    let (source, _dir) = open_db();
    let outcome = source.insert("a", serde_json::Value::Null, InsertOptions { no_embed: true, ..Default::default() }).unwrap();

    let mut buf = Vec::new();
    export_ndjson(&source, &mut buf, None).unwrap();

    let (dest, _dir2) = open_db();
    let mut cursor = Cursor::new(buf);
    import_ndjson(&dest, &mut cursor, true).unwrap();

    let listed = dest.list(memori::ListSort::Created, 10, 0, None, None, None, false).unwrap();
    assert_eq!(listed.len(), 1);
    assert_ne!(listed[0].id, outcome.id);
}

#[test]
fn test_import_reports_per_line_errors_without_aborting() {
    let (dest, _dir) = open_db();
    let input = "not json at all\n{\"id\": \"00000000-0000-0000-0000-000000000001\", \"content\": \"ok\", \"created_at\": 0.0, \"updated_at\": 0.0}\n";
    let mut cursor = Cursor::new(input.as_bytes().to_vec());
    let summary = import_ndjson(&dest, &mut cursor, false).unwrap();
    assert_eq!(summary.imported, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].0, 1);
}
