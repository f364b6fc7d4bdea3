//! Integration tests for maintenance operations: counts, backfill, purge.

use memori::embedding::DeterministicEmbedder;
use memori::{Config, InsertOptions, Memori, Timestamp};
use serde_json::json;
use tempfile::tempdir;

fn open_db() -> (Memori, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let db = Memori::open(&path, Config::default())
        .unwrap()
        .with_embedder(Box::new(DeterministicEmbedder::new(8)));
    (db, dir)
}

#[test]
fn test_count_respects_type_filter() {
    let (db, _dir) = open_db();
    db.insert("a", json!({"type": "fact"}), InsertOptions::default()).unwrap();
    db.insert("b", json!({"type": "fact"}), InsertOptions::default()).unwrap();
    db.insert("c", json!({"type": "preference"}), InsertOptions::default()).unwrap();

    assert_eq!(db.count(None).unwrap(), 3);
    assert_eq!(db.count(Some("fact")).unwrap(), 2);
    assert_eq!(db.count(Some("preference")).unwrap(), 1);
}

#[test]
fn test_type_distribution_orders_most_common_first() {
    let (db, _dir) = open_db();
    db.insert("a", json!({"type": "fact"}), InsertOptions::default()).unwrap();
    db.insert("b", json!({"type": "fact"}), InsertOptions::default()).unwrap();
    db.insert("c", json!({"type": "preference"}), InsertOptions::default()).unwrap();

    let dist = db.type_distribution().unwrap();
    assert_eq!(dist[0], ("fact".to_string(), 2));
    assert_eq!(dist[1], ("preference".to_string(), 1));
}

#[test]
fn test_backfill_embeddings_fills_only_missing_vectors() {
    let (db, _dir) = open_db();
    db.insert(
        "already embedded",
        serde_json::Value::Null,
        InsertOptions::default(),
    )
    .unwrap();
    db.insert(
        "needs a vector",
        serde_json::Value::Null,
        InsertOptions { no_embed: true, ..Default::default() },
    )
    .unwrap();

    let before = db.embedding_stats().unwrap();
    assert_eq!(before.with_vector, 1);
    assert_eq!(before.without_vector, 1);

    let embedded = db.backfill_embeddings(10).unwrap();
    assert_eq!(embedded, 1);

    let after = db.embedding_stats().unwrap();
    assert_eq!(after.with_vector, 2);
    assert_eq!(after.without_vector, 0);
}

#[test]
fn test_delete_before_purges_only_older_rows_of_matching_type() {
    let (db, _dir) = open_db();
    db.insert("old fact", json!({"type": "fact"}), InsertOptions { no_embed: true, ..Default::default() }).unwrap();
    db.insert("old preference", json!({"type": "preference"}), InsertOptions { no_embed: true, ..Default::default() }).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    let cutoff = Timestamp::now();
    std::thread::sleep(std::time::Duration::from_millis(5));
    db.insert("new fact", json!({"type": "fact"}), InsertOptions { no_embed: true, ..Default::default() }).unwrap();

    let deleted = db.delete_before(cutoff, Some("fact")).unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(db.count(None).unwrap(), 2);
    assert_eq!(db.count(Some("preference")).unwrap(), 1);
}

#[test]
fn test_delete_by_type_removes_all_matching_rows() {
    let (db, _dir) = open_db();
    db.insert("a", json!({"type": "fact"}), InsertOptions { no_embed: true, ..Default::default() }).unwrap();
    db.insert("b", json!({"type": "fact"}), InsertOptions { no_embed: true, ..Default::default() }).unwrap();
    db.insert("c", json!({"type": "preference"}), InsertOptions { no_embed: true, ..Default::default() }).unwrap();

    let deleted = db.delete_by_type("fact").unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(db.count(None).unwrap(), 1);
}

#[test]
fn test_vacuum_runs_without_error_after_deletes() {
    let (db, _dir) = open_db();
    let outcome = db.insert("a", serde_json::Value::Null, InsertOptions { no_embed: true, ..Default::default() }).unwrap();
    db.delete(&outcome.id.to_string()).unwrap();
    db.vacuum().unwrap();
}
