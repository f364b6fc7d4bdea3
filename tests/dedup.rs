//! Integration tests for insert-time deduplication.

use memori::{Config, InsertAction, InsertOptions, Memori};
use serde_json::json;
use tempfile::tempdir;

fn open_db() -> (Memori, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let db = Memori::open(&path, Config::default()).unwrap();
    (db, dir)
}

#[test]
fn test_dedup_merges_near_duplicate_of_same_type() {
    let (db, _dir) = open_db();
    let first = db
        .insert(
            "the build takes about ten minutes",
            json!({"type": "fact"}),
            InsertOptions {
                vector: Some(vec![1.0, 0.0, 0.0]),
                dedup: true,
                ..Default::default()
            },
        )
        .unwrap();

    let second = db
        .insert(
            "the build takes roughly ten minutes",
            json!({"type": "fact"}),
            InsertOptions {
                vector: Some(vec![1.0, 0.0001, 0.0]),
                dedup: true,
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(second.action, InsertAction::Deduplicated);
    assert_eq!(second.id, first.id);
    assert_eq!(db.count(None).unwrap(), 1);
    let merged = db.get_readonly(&first.id.to_string()).unwrap().unwrap();
    assert_eq!(merged.content, "the build takes roughly ten minutes");
}

#[test]
fn test_dedup_ignores_candidates_of_a_different_type() {
    let (db, _dir) = open_db();
    db.insert(
        "a fact",
        json!({"type": "fact"}),
        InsertOptions { vector: Some(vec![1.0, 0.0]), dedup: true, ..Default::default() },
    )
    .unwrap();
    let second = db
        .insert(
            "a preference with the same vector",
            json!({"type": "preference"}),
            InsertOptions { vector: Some(vec![1.0, 0.0]), dedup: true, ..Default::default() },
        )
        .unwrap();

    assert_eq!(second.action, InsertAction::Created);
    assert_eq!(db.count(None).unwrap(), 2);
}

#[test]
fn test_dedup_below_threshold_creates_a_new_row() {
    let (db, _dir) = open_db();
    db.insert(
        "orthogonal a",
        json!({"type": "fact"}),
        InsertOptions { vector: Some(vec![1.0, 0.0]), dedup: true, dedup_threshold: Some(0.99), ..Default::default() },
    )
    .unwrap();
    let second = db
        .insert(
            "orthogonal b",
            json!({"type": "fact"}),
            InsertOptions { vector: Some(vec![0.0, 1.0]), dedup: true, dedup_threshold: Some(0.99), ..Default::default() },
        )
        .unwrap();

    assert_eq!(second.action, InsertAction::Created);
    assert_eq!(db.count(None).unwrap(), 2);
}

#[test]
fn test_dedup_not_attempted_without_dedup_flag() {
    let (db, _dir) = open_db();
    db.insert(
        "identical content a",
        json!({"type": "fact"}),
        InsertOptions { vector: Some(vec![1.0, 0.0]), ..Default::default() },
    )
    .unwrap();
    let second = db
        .insert(
            "identical content b",
            json!({"type": "fact"}),
            InsertOptions { vector: Some(vec![1.0, 0.0]), ..Default::default() },
        )
        .unwrap();

    assert_eq!(second.action, InsertAction::Created);
    assert_eq!(db.count(None).unwrap(), 2);
}
