//! The `Memory` entity and the small value types built around it.

use serde_json::Value as Json;

use crate::types::{Embedding, MemoryId, Timestamp};

/// A single stored memory.
///
/// `vector` is only populated when the caller asked for it (`include_vectors`
/// on search/list/related/get) or when [`Store::get`](crate::Store::get) /
/// [`Store::get_readonly`](crate::Store::get_readonly) return the full row.
#[derive(Clone, Debug, PartialEq)]
pub struct Memory {
    /// Primary key, a 36-character UUID string.
    pub id: MemoryId,
    /// UTF-8 content, length >= 1.
    pub content: String,
    /// Arbitrary JSON object, or `null`. Always a `Json::Object` or `Json::Null`
    /// once it has passed through [`crate::Store`].
    pub metadata: Json,
    /// Dense embedding of fixed dimension D, or `None`.
    pub vector: Option<Embedding>,
    /// Set on create; never auto-changed.
    pub created_at: Timestamp,
    /// Set on create; refreshed on mutation of content/metadata/vector.
    pub updated_at: Timestamp,
    /// Refreshed only by [`crate::Store::get`].
    pub last_accessed: Option<Timestamp>,
    /// Incremented only by [`crate::Store::get`].
    pub access_count: u64,
}

impl Memory {
    /// Returns `metadata["type"]` as a string, if present and a string.
    ///
    /// `type` is a recognized convention used by filters and dedup scoping,
    /// but not a schema-enforced field.
    pub fn memory_type(&self) -> Option<&str> {
        self.metadata.get("type").and_then(Json::as_str)
    }
}

/// Outcome of [`crate::Store::insert`] — whether a new row was created or
/// an existing one was updated via dedup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertAction {
    /// A new row was created.
    Created,
    /// An existing row (of the same `type`, within the dedup threshold)
    /// was updated instead.
    Deduplicated,
}

/// Result of [`crate::Store::insert`] / [`crate::Store::insert_with_id`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InsertOutcome {
    /// The id of the affected row (new, or the deduplication target).
    pub id: MemoryId,
    /// Whether the row was newly created or deduplicated into an existing one.
    pub action: InsertAction,
}

/// A retrieval result: a [`Memory`] plus an optional relevance score.
/// All public `score` fields are higher-is-better floats.
///
/// `score` is `None` for empty-query recency listings and for plain
/// `list()` calls; it is always `Some` for vector, text, and hybrid search.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchResult {
    /// The matched memory. `vector` is `None` unless `include_vectors=true`
    /// was passed to the query that produced this result.
    pub memory: Memory,
    /// Higher-is-better relevance score, or `None` when no ranking was
    /// computed (empty-query recency order, or `list()`).
    pub score: Option<f64>,
}

/// Sort key for [`crate::Store::list`]. All orders are descending;
/// `NULL`s sort last.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListSort {
    /// Order by `created_at` descending.
    Created,
    /// Order by `updated_at` descending.
    Updated,
    /// Order by `last_accessed` descending, `NULL`s last.
    Accessed,
    /// Order by `access_count` descending.
    Count,
}
