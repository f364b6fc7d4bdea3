//! The `Memori` facade: the main entry point for opening a database and
//! performing every read/write/search/maintenance operation.
//!
//! `Memori` wires together a [`Store`] (row storage, FTS5, vector sidecar),
//! an [`Embedder`] (auto-embedding text on write and query), and a
//! [`Config`] (dedup threshold, RRF tuning). Everything else — dedup,
//! fused ranking, prefix resolution — lives in small pure modules that
//! `Memori` calls into.

use std::path::Path;

use serde_json::Value as Json;
use tracing::instrument;

use crate::config::Config;
use crate::embedding::{Embedder, NullEmbedder};
use crate::error::{MemoriError, Result};
use crate::memory::{ListSort, Memory, SearchResult};
use crate::rrf;
use crate::store::{EmbeddingStats, Store, VectorUpdate};
use crate::types::{Embedding, MemoryId, Timestamp};

/// Options controlling how [`Memori::insert`] / [`Memori::insert_with_id`]
/// derive and deduplicate a vector for a new memory.
#[derive(Clone, Debug, Default)]
pub struct InsertOptions {
    /// An explicit vector. If given, the configured embedder is not called.
    pub vector: Option<Embedding>,
    /// Skip embedding entirely (the memory is stored without a vector, and
    /// will not participate in vector or hybrid search).
    pub no_embed: bool,
    /// Whether to attempt dedup against existing same-`type` memories.
    pub dedup: bool,
    /// Overrides [`Config::default_dedup_threshold`] for this call.
    pub dedup_threshold: Option<f32>,
}

/// A search request. Leaving both `text` and `vector` empty returns the
/// most recently created memories with no score, matching [`Memori::list`]
/// with [`ListSort::Created`].
#[derive(Clone, Debug, Default)]
pub struct SearchQuery {
    /// Free-text query, matched against FTS5 and (if no explicit `vector`
    /// is given, `text_only` is false, and an embedder is configured)
    /// embedded for vector search.
    pub text: Option<String>,
    /// An explicit query vector, bypassing the configured embedder.
    pub vector: Option<Embedding>,
    /// Maximum number of results.
    pub limit: usize,
    /// Restrict to memories whose `metadata.type` equals this value. A
    /// convenience for the common case; equivalent to putting `"type"` in
    /// `filter`. If both are given and `filter` also sets `"type"`,
    /// `filter`'s value wins.
    pub type_filter: Option<String>,
    /// Restrict to memories whose metadata has, for every `(k, v)` here, key
    /// `k` with a JSON-equal value `v`. Evaluated as a SQL predicate before
    /// ranking, same as `type_filter`/`before`/`after`.
    pub filter: Option<Json>,
    /// Restrict to memories created before this time.
    pub before: Option<Timestamp>,
    /// Restrict to memories created after this time.
    pub after: Option<Timestamp>,
    /// Forces text-only ranking, even if an embedder is configured and
    /// could otherwise derive a vector from `text` for hybrid search.
    pub text_only: bool,
    /// Whether to populate `vector` on returned memories.
    pub include_vectors: bool,
}

/// The embedded memory store.
///
/// `Memori` is `Send + Sync` — [`Store`] serializes access to its
/// connection internally, so a single instance can be shared across
/// threads (e.g. wrapped in an `Arc`) without external locking.
pub struct Memori {
    store: Store,
    embedder: Box<dyn Embedder>,
    config: Config,
}

impl Memori {
    /// Opens (creating if necessary) a database file at `path`.
    ///
    /// Uses [`NullEmbedder`] until [`Memori::with_embedder`] is called;
    /// writes without an explicit vector will fail with
    /// [`MemoriError::EmbedderUnavailable`] until a real embedder is set.
    #[instrument(skip(path, config))]
    pub fn open(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        config.validate()?;
        let store = Store::open(path)?;
        Ok(Self {
            store,
            embedder: Box::new(NullEmbedder),
            config,
        })
    }

    /// Opens a private, in-memory database. Useful for tests and
    /// short-lived sessions that don't need persistence.
    pub fn open_in_memory(config: Config) -> Result<Self> {
        config.validate()?;
        let store = Store::open_in_memory()?;
        Ok(Self {
            store,
            embedder: Box::new(NullEmbedder),
            config,
        })
    }

    /// Replaces the configured embedder. Consumes and returns `self` for
    /// builder-style chaining:
    ///
    /// ```
    /// use memori::{Memori, Config};
    /// use memori::embedding::DeterministicEmbedder;
    ///
    /// let db = Memori::open_in_memory(Config::default())
    ///     .unwrap()
    ///     .with_embedder(Box::new(DeterministicEmbedder::new(8)));
    /// ```
    pub fn with_embedder(mut self, embedder: Box<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    /// Returns the configured embedder's fixed output dimension.
    pub fn embedder_dimension(&self) -> usize {
        self.embedder.dimension()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Inserts a new memory with a random id.
    #[instrument(skip(self, content, metadata, opts))]
    pub fn insert(&self, content: impl Into<String>, metadata: Json, opts: InsertOptions) -> Result<crate::memory::InsertOutcome> {
        let content = content.into();
        let vector = self.resolve_write_vector(&content, &opts)?;
        let dedup_threshold = opts.dedup.then(|| opts.dedup_threshold.unwrap_or(self.config.default_dedup_threshold));
        self.store.insert(content, metadata, vector, dedup_threshold)
    }

    /// Inserts a new memory under a caller-supplied id.
    ///
    /// For import: `created_at`/`updated_at` preserve the original
    /// timestamps of the row being restored instead of stamping now.
    #[instrument(skip(self, content, metadata, opts))]
    pub fn insert_with_id(
        &self,
        id: MemoryId,
        content: impl Into<String>,
        metadata: Json,
        opts: InsertOptions,
        created_at: Option<Timestamp>,
        updated_at: Option<Timestamp>,
    ) -> Result<crate::memory::InsertOutcome> {
        let content = content.into();
        let vector = self.resolve_write_vector(&content, &opts)?;
        let dedup_threshold = opts.dedup.then(|| opts.dedup_threshold.unwrap_or(self.config.default_dedup_threshold));
        self.store.insert_with_id(id, content, metadata, vector, dedup_threshold, created_at, updated_at)
    }

    fn resolve_write_vector(&self, content: &str, opts: &InsertOptions) -> Result<Option<Embedding>> {
        if let Some(v) = &opts.vector {
            return Ok(Some(v.clone()));
        }
        if opts.no_embed {
            return Ok(None);
        }
        Ok(Some(self.embedder.embed(content)?))
    }

    /// Updates content, metadata, and/or vector of an existing memory.
    ///
    /// When `metadata` is given, `merge_metadata=true` (the default a host
    /// should reach for) shallow-merges it into the existing metadata
    /// object, later keys winning; `merge_metadata=false` replaces the
    /// metadata object wholesale.
    #[instrument(skip(self, content, metadata))]
    pub fn update(
        &self,
        id_or_prefix: &str,
        content: Option<String>,
        metadata: Option<Json>,
        vector: VectorUpdate,
        merge_metadata: bool,
    ) -> Result<Memory> {
        self.store.update(id_or_prefix, content, metadata, vector, merge_metadata)
    }

    /// Merges `tags` into a memory's `metadata.tags` array (creating it if
    /// absent), skipping any already present.
    #[instrument(skip(self))]
    pub fn tag(&self, id_or_prefix: &str, tags: Vec<String>) -> Result<Memory> {
        let id = self.store.resolve_required(id_or_prefix)?;
        let existing = self
            .store
            .get_readonly(&id.to_string())?
            .ok_or_else(|| MemoriError::not_found(id.to_string()))?;

        let mut merged: Vec<String> = existing
            .metadata
            .get("tags")
            .and_then(Json::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        for t in tags {
            if !merged.contains(&t) {
                merged.push(t);
            }
        }

        let mut metadata = if existing.metadata.is_object() {
            existing.metadata
        } else {
            serde_json::json!({})
        };
        metadata["tags"] = serde_json::json!(merged);

        // `metadata` already holds the full desired object (existing keys
        // plus the merged tag list), so this is a wholesale replace, not a
        // second merge pass.
        self.store.update(&id.to_string(), None, Some(metadata), VectorUpdate::Keep, false)
    }

    /// Permanently deletes a memory. Returns `true` if a row was removed.
    #[instrument(skip(self))]
    pub fn delete(&self, id_or_prefix: &str) -> Result<bool> {
        self.store.delete(id_or_prefix)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Resolves `id_or_prefix`, bumping its access counter, and returns
    /// the pre-increment snapshot. Returns `Ok(None)` for an unmatched or
    /// ambiguous prefix.
    #[instrument(skip(self))]
    pub fn get(&self, id_or_prefix: &str) -> Result<Option<Memory>> {
        self.store.get(id_or_prefix)
    }

    /// Resolves and reads a memory without touching access tracking.
    #[instrument(skip(self))]
    pub fn get_readonly(&self, id_or_prefix: &str) -> Result<Option<Memory>> {
        self.store.get_readonly(id_or_prefix)
    }

    /// Lists memories ordered by `sort`, descending, with no relevance
    /// score attached, optionally restricted to a `type` and/or a
    /// `created_at` date range.
    #[instrument(skip(self))]
    pub fn list(
        &self,
        sort: ListSort,
        limit: usize,
        offset: usize,
        type_filter: Option<&str>,
        before: Option<Timestamp>,
        after: Option<Timestamp>,
        include_vectors: bool,
    ) -> Result<Vec<Memory>> {
        self.store.list(sort, limit, offset, type_filter, before, after, include_vectors)
    }

    /// Runs a search: vector-only, text-only, or hybrid (reciprocal rank
    /// fusion of both), depending on what `query` supplies.
    ///
    /// - `text` and `vector` both resolve: hybrid. Candidate fan-out on
    ///   each side is `max(limit * 4, 50)` before fusion trims to `limit`.
    /// - Only a vector resolves (explicit, or `text` given but no
    ///   embedder configured and no explicit vector): vector-only, scored
    ///   by cosine similarity.
    /// - Only `text` given and no vector resolves: text-only, scored by
    ///   negated `bm25()`.
    /// - Neither given: most-recently-created memories, unscored.
    #[instrument(skip(self, query))]
    pub fn search(&self, query: SearchQuery) -> Result<Vec<SearchResult>> {
        let filter = Self::effective_filter(query.type_filter.as_deref(), query.filter.as_ref());
        let filter = filter.as_ref();
        let resolved_vector = if query.text_only {
            None
        } else {
            match query.vector {
                Some(v) => Some(v),
                None => match &query.text {
                    Some(text) => self.embedder.embed(text).ok(),
                    None => None,
                },
            }
        };

        match (&resolved_vector, &query.text) {
            (Some(v), Some(text)) => {
                let fanout = self.config.hybrid_fanout(query.limit);
                let vector_ranked = self.store.vector_ranked(v, fanout, filter, query.before, query.after, None)?;
                let text_ranked = self.store.text_ranked(text, fanout, filter, query.before, query.after)?;
                let vector_ids: Vec<MemoryId> = vector_ranked.iter().map(|(id, _)| *id).collect();
                let text_ids: Vec<MemoryId> = text_ranked.iter().map(|(id, _)| *id).collect();
                let fused = rrf::fuse(&vector_ids, &text_ids, self.config.rrf_k);
                self.to_search_results(
                    fused.into_iter().take(query.limit).collect(),
                    query.include_vectors,
                )
            }
            (Some(v), None) => {
                let ranked = self.store.vector_ranked(v, query.limit, filter, query.before, query.after, None)?;
                self.to_search_results(
                    ranked.into_iter().map(|(id, s)| (id, s as f64)).collect(),
                    query.include_vectors,
                )
            }
            (None, Some(text)) => {
                let ranked = self.store.text_ranked(text, query.limit, filter, query.before, query.after)?;
                self.to_search_results(ranked, query.include_vectors)
            }
            (None, None) => {
                let rows = self.store.list_filtered(
                    ListSort::Created,
                    query.limit,
                    0,
                    filter,
                    query.before,
                    query.after,
                    query.include_vectors,
                )?;
                Ok(rows
                    .into_iter()
                    .map(|memory| SearchResult { memory, score: None })
                    .collect())
            }
        }
    }

    /// Merges the `type_filter` convenience into `filter`, inserting
    /// `"type"` only if `filter` doesn't already set it. Returns `None` if
    /// neither is given.
    fn effective_filter(type_filter: Option<&str>, filter: Option<&Json>) -> Option<Json> {
        match (type_filter, filter) {
            (None, None) => None,
            (Some(t), None) => Some(serde_json::json!({"type": t})),
            (None, Some(f)) => Some(f.clone()),
            (Some(t), Some(f)) => match f.as_object() {
                Some(map) if !map.contains_key("type") => {
                    let mut map = map.clone();
                    map.insert("type".to_string(), Json::from(t));
                    Some(Json::Object(map))
                }
                _ => Some(f.clone()),
            },
        }
    }

    fn to_search_results(&self, ranked: Vec<(MemoryId, f64)>, include_vectors: bool) -> Result<Vec<SearchResult>> {
        let ids: Vec<MemoryId> = ranked.iter().map(|(id, _)| *id).collect();
        let mut rows = self.store.fetch_many(&ids, include_vectors)?;
        let mut results = Vec::with_capacity(ranked.len());
        for (id, score) in ranked {
            if let Some(memory) = rows.remove(&id) {
                results.push(SearchResult {
                    memory,
                    score: Some(score),
                });
            }
        }
        Ok(results)
    }

    /// Finds memories whose vectors are nearest to `id_or_prefix`'s own
    /// vector, excluding itself. Fails with [`MemoriError::NoEmbedding`]
    /// if the resolved memory has no stored vector.
    #[instrument(skip(self))]
    pub fn related(&self, id_or_prefix: &str, limit: usize, include_vectors: bool) -> Result<Vec<SearchResult>> {
        let id = self.store.resolve_required(id_or_prefix)?;
        let memory = self
            .store
            .get_readonly(&id.to_string())?
            .ok_or_else(|| MemoriError::not_found(id.to_string()))?;
        let vector = memory
            .vector
            .ok_or_else(|| MemoriError::NoEmbedding(id.to_string()))?;
        let ranked = self.store.vector_ranked(&vector, limit, None, None, None, Some(id))?;
        self.to_search_results(
            ranked.into_iter().map(|(id, s)| (id, s as f64)).collect(),
            include_vectors,
        )
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Counts memories, optionally restricted to a `type`.
    pub fn count(&self, type_filter: Option<&str>) -> Result<u64> {
        self.store.count(type_filter)
    }

    /// Returns `(type, count)` pairs, most common first.
    pub fn type_distribution(&self) -> Result<Vec<(String, u64)>> {
        self.store.type_distribution()
    }

    /// Counts memories with and without a stored vector.
    pub fn embedding_stats(&self) -> Result<EmbeddingStats> {
        self.store.embedding_stats()
    }

    /// Embeds up to `batch_size` memories that have no stored vector,
    /// using the configured embedder. Returns the number embedded.
    #[instrument(skip(self))]
    pub fn backfill_embeddings(&self, batch_size: usize) -> Result<u64> {
        let rows = self.store.rows_missing_vector(batch_size)?;
        let mut embedded = 0u64;
        for (id, content) in rows {
            let vector = self.embedder.embed(&content)?;
            self.store.set_vector(id, &vector)?;
            embedded += 1;
        }
        Ok(embedded)
    }

    /// Deletes all memories created before `before`, optionally restricted
    /// to a `type`. Returns the number of rows deleted.
    #[instrument(skip(self))]
    pub fn delete_before(&self, before: Timestamp, type_filter: Option<&str>) -> Result<u64> {
        self.store.delete_before(before, type_filter)
    }

    /// Deletes all memories of the given `type`. Returns the number of
    /// rows deleted.
    #[instrument(skip(self))]
    pub fn delete_by_type(&self, memory_type: &str) -> Result<u64> {
        self.store.delete_by_type(memory_type)
    }

    /// Runs `VACUUM` to reclaim space after large deletes.
    pub fn vacuum(&self) -> Result<()> {
        self.store.vacuum()
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }
}
