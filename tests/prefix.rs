//! Integration tests for id-prefix resolution: reads tolerate ambiguity,
//! mutations don't.

use memori::{Config, InsertOptions, Memori};
use tempfile::tempdir;

fn open_db() -> (Memori, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let db = Memori::open(&path, Config::default()).unwrap();
    (db, dir)
}

#[test]
fn test_full_id_resolves_to_exact_match() {
    let (db, _dir) = open_db();
    let outcome = db
        .insert("a", serde_json::Value::Null, InsertOptions { no_embed: true, ..Default::default() })
        .unwrap();
    let m = db.get_readonly(&outcome.id.to_string()).unwrap().unwrap();
    assert_eq!(m.id, outcome.id);
}

#[test]
fn test_unique_prefix_resolves_for_reads_and_writes() {
    let (db, _dir) = open_db();
    let outcome = db
        .insert("a", serde_json::Value::Null, InsertOptions { no_embed: true, ..Default::default() })
        .unwrap();
    let full = outcome.id.to_string();
    let prefix = &full[..12];

    assert!(db.get_readonly(prefix).unwrap().is_some());
    let updated = db.update(prefix, Some("b".into()), None, memori::VectorUpdate::Keep, true).unwrap();
    assert_eq!(updated.id, outcome.id);
}

#[test]
fn test_nonexistent_prefix_is_none_for_reads_and_error_for_writes() {
    let (db, _dir) = open_db();
    assert!(db.get_readonly("deadbeef").unwrap().is_none());
    let err = db.delete("deadbeef").unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_ambiguous_prefix_collapses_to_none_for_reads() {
    let (db, _dir) = open_db();
    // The empty string prefix matches everything once more than one row
    // exists.
    db.insert("a", serde_json::Value::Null, InsertOptions { no_embed: true, ..Default::default() }).unwrap();
    db.insert("b", serde_json::Value::Null, InsertOptions { no_embed: true, ..Default::default() }).unwrap();
    assert!(db.get_readonly("").unwrap().is_none());
}

#[test]
fn test_ambiguous_prefix_is_an_error_for_mutations() {
    let (db, _dir) = open_db();
    db.insert("a", serde_json::Value::Null, InsertOptions { no_embed: true, ..Default::default() }).unwrap();
    db.insert("b", serde_json::Value::Null, InsertOptions { no_embed: true, ..Default::default() }).unwrap();
    let err = db.delete("").unwrap_err();
    assert!(err.is_ambiguous());
}
