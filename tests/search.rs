//! Integration tests for search: vector-only, text-only, hybrid (RRF), and
//! vector-similarity `related`.

use memori::{Config, InsertOptions, Memori, MemoriError, SearchQuery, Timestamp};
use serde_json::json;
use tempfile::tempdir;

const DIM: usize = 16;

/// Generates a deterministic embedding from a seed. Vectors with close
/// seeds produce similar embeddings (smooth sin curve), so similarity
/// ordering is predictable without a real embedding model.
fn make_embedding(seed: u64) -> Vec<f32> {
    (0..DIM).map(|i| (seed as f32 * 0.1 + i as f32 * 0.01).sin()).collect()
}

fn open_db() -> (Memori, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let db = Memori::open(&path, Config::default()).unwrap();
    (db, dir)
}

fn insert_vec(db: &Memori, content: &str, seed: u64) -> memori::MemoryId {
    db.insert(
        content,
        json!({"type": "fact"}),
        InsertOptions {
            vector: Some(make_embedding(seed)),
            ..Default::default()
        },
    )
    .unwrap()
    .id
}

// ============================================================================
// Vector-only search
// ============================================================================

#[test]
fn test_vector_search_orders_by_similarity_descending() {
    let (db, _dir) = open_db();
    for seed in 0..10u64 {
        insert_vec(&db, &format!("row {seed}"), seed);
    }

    let query = make_embedding(5);
    let results = db
        .search(SearchQuery {
            vector: Some(query),
            limit: 5,
            ..Default::default()
        })
        .unwrap();

    assert!(!results.is_empty());
    assert!(results.len() <= 5);
    for window in results.windows(2) {
        assert!(window[0].score.unwrap() >= window[1].score.unwrap());
    }
}

#[test]
fn test_vector_search_respects_type_filter() {
    let (db, _dir) = open_db();
    for seed in 0..5u64 {
        db.insert(
            format!("rust {seed}"),
            json!({"type": "rust"}),
            InsertOptions { vector: Some(make_embedding(seed)), ..Default::default() },
        )
        .unwrap();
    }
    for seed in 5..10u64 {
        db.insert(
            format!("python {seed}"),
            json!({"type": "python"}),
            InsertOptions { vector: Some(make_embedding(seed)), ..Default::default() },
        )
        .unwrap();
    }

    let results = db
        .search(SearchQuery {
            vector: Some(make_embedding(2)),
            limit: 20,
            type_filter: Some("rust".to_string()),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(results.len(), 5);
    for r in &results {
        assert_eq!(r.memory.memory_type(), Some("rust"));
    }
}

#[test]
fn test_vector_search_respects_generic_metadata_filter() {
    let (db, _dir) = open_db();
    for seed in 0..5u64 {
        db.insert(
            format!("slack {seed}"),
            json!({"type": "fact", "source": "slack"}),
            InsertOptions { vector: Some(make_embedding(seed)), ..Default::default() },
        )
        .unwrap();
    }
    for seed in 5..10u64 {
        db.insert(
            format!("email {seed}"),
            json!({"type": "fact", "source": "email"}),
            InsertOptions { vector: Some(make_embedding(seed)), ..Default::default() },
        )
        .unwrap();
    }

    let results = db
        .search(SearchQuery {
            vector: Some(make_embedding(2)),
            limit: 20,
            filter: Some(json!({"source": "slack"})),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(results.len(), 5);
    for r in &results {
        assert_eq!(r.memory.metadata["source"], "slack");
    }
}

#[test]
fn test_empty_query_respects_generic_metadata_filter() {
    let (db, _dir) = open_db();
    db.insert("keep", json!({"type": "fact", "archived": false}), InsertOptions { no_embed: true, ..Default::default() }).unwrap();
    db.insert("drop", json!({"type": "fact", "archived": true}), InsertOptions { no_embed: true, ..Default::default() }).unwrap();

    let results = db
        .search(SearchQuery {
            limit: 10,
            filter: Some(json!({"archived": false})),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].memory.content, "keep");
}

// ============================================================================
// Text-only search
// ============================================================================

#[test]
fn test_text_search_matches_content() {
    let (db, _dir) = open_db();
    db.insert("the deploy pipeline retries three times", serde_json::Value::Null, InsertOptions { no_embed: true, ..Default::default() }).unwrap();
    db.insert("an entirely unrelated sentence", serde_json::Value::Null, InsertOptions { no_embed: true, ..Default::default() }).unwrap();

    let results = db
        .search(SearchQuery {
            text: Some("deploy pipeline".to_string()),
            limit: 10,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].memory.content.contains("deploy pipeline"));
}

#[test]
fn test_text_search_falls_back_when_no_embedder_configured() {
    let (db, _dir) = open_db();
    db.insert("kafka consumer lag alert", serde_json::Value::Null, InsertOptions { no_embed: true, ..Default::default() }).unwrap();
    // No embedder is configured, so a text-only query must not try (and
    // fail) to embed; it should silently run text-only.
    let results = db
        .search(SearchQuery {
            text: Some("kafka consumer lag".to_string()),
            limit: 10,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(results.len(), 1);
}

// ============================================================================
// Hybrid search
// ============================================================================

#[test]
fn test_hybrid_search_fuses_vector_and_text_rankings() {
    let (db, _dir) = open_db();
    db.insert(
        "kafka consumer lag incident postmortem",
        serde_json::Value::Null,
        InsertOptions { vector: Some(make_embedding(1)), ..Default::default() },
    )
    .unwrap();
    db.insert(
        "totally unrelated vector neighbor",
        serde_json::Value::Null,
        InsertOptions { vector: Some(make_embedding(2)), ..Default::default() },
    )
    .unwrap();

    let results = db
        .search(SearchQuery {
            text: Some("kafka consumer lag".to_string()),
            vector: Some(make_embedding(1)),
            limit: 10,
            ..Default::default()
        })
        .unwrap();

    assert!(!results.is_empty());
    assert!(results[0].memory.content.contains("kafka"));
    assert!(results[0].score.is_some());
}

#[test]
fn test_text_only_ignores_vector_even_when_embedder_would_resolve_one() {
    let (db, _dir) = open_db();
    db.insert(
        "kafka consumer lag incident postmortem",
        serde_json::Value::Null,
        InsertOptions { vector: Some(make_embedding(1)), ..Default::default() },
    )
    .unwrap();
    db.insert(
        "totally unrelated vector neighbor",
        serde_json::Value::Null,
        InsertOptions { vector: Some(make_embedding(2)), ..Default::default() },
    )
    .unwrap();

    // An explicit vector is supplied alongside text_only; text_only wins
    // and the query falls back to a pure FTS match.
    let results = db
        .search(SearchQuery {
            text: Some("kafka consumer lag".to_string()),
            vector: Some(make_embedding(2)),
            text_only: true,
            limit: 10,
            ..Default::default()
        })
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].memory.content.contains("kafka"));
}

// ============================================================================
// Date range filtering
// ============================================================================

#[test]
fn test_search_before_after_restrict_to_a_created_at_window() {
    let (db, _dir) = open_db();
    db.insert("old fact", serde_json::Value::Null, InsertOptions { no_embed: true, ..Default::default() }).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    let after = Timestamp::now();
    std::thread::sleep(std::time::Duration::from_millis(5));
    db.insert("new fact", serde_json::Value::Null, InsertOptions { no_embed: true, ..Default::default() }).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    let before = Timestamp::now();
    std::thread::sleep(std::time::Duration::from_millis(5));
    db.insert("newest fact", serde_json::Value::Null, InsertOptions { no_embed: true, ..Default::default() }).unwrap();

    let results = db
        .search(SearchQuery {
            limit: 10,
            after: Some(after),
            before: Some(before),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].memory.content, "new fact");
}

// ============================================================================
// Empty query
// ============================================================================

#[test]
fn test_empty_query_returns_unscored_recency_order() {
    let (db, _dir) = open_db();
    db.insert("first", serde_json::Value::Null, InsertOptions { no_embed: true, ..Default::default() }).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(2));
    db.insert("second", serde_json::Value::Null, InsertOptions { no_embed: true, ..Default::default() }).unwrap();

    let results = db
        .search(SearchQuery {
            limit: 10,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.score.is_none()));
    assert_eq!(results[0].memory.content, "second");
}

// ============================================================================
// Related
// ============================================================================

#[test]
fn test_related_excludes_self_and_orders_by_similarity() {
    let (db, _dir) = open_db();
    let anchor = insert_vec(&db, "anchor", 3);
    insert_vec(&db, "near neighbor", 3); // near-identical seed
    insert_vec(&db, "far neighbor", 90);

    let results = db.related(&anchor.to_string(), 10, false).unwrap();
    assert!(results.iter().all(|r| r.memory.id != anchor));
    assert!(!results.is_empty());
}

#[test]
fn test_related_requires_a_stored_vector() {
    let (db, _dir) = open_db();
    let outcome = db.insert("no vector here", serde_json::Value::Null, InsertOptions { no_embed: true, ..Default::default() }).unwrap();
    let err = db.related(&outcome.id.to_string(), 5, false).unwrap_err();
    assert!(matches!(err, MemoriError::NoEmbedding(_)));
}
