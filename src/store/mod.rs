//! The SQLite-backed memory store.
//!
//! [`Store`] owns the single `rusqlite::Connection` for a database file and
//! implements every row-level operation memori exposes: inserts (with
//! dedup), reads (with and without access tracking), updates, deletes,
//! prefix resolution, maintenance queries, and the two halves of hybrid
//! search (`vector_ranked`, `text_ranked`). Each mutating method opens and
//! commits exactly one transaction, keeping `memories`, `memories_fts`,
//! and `memories_vectors` in lockstep.
//!
//! A single [`std::sync::Mutex`] serializes all access to the connection.
//! SQLite already serializes writers internally; wrapping the connection
//! lets `Store` be `Send + Sync` so a host can share one `Memori` across
//! threads without each call opening its own connection.

pub mod schema;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value as Json;
use tracing::instrument;

use crate::dedup::{self, Candidate};
use crate::error::{MemoriError, Result, StorageError, ValidationError};
use crate::id_resolve::{self, Resolution};
use crate::memory::{InsertAction, InsertOutcome, ListSort, Memory};
use crate::types::{Embedding, MemoryId, Timestamp};

/// How a caller wants a memory's vector handled on update.
#[derive(Clone, Debug, PartialEq)]
pub enum VectorUpdate {
    /// Leave the stored vector (if any) untouched.
    Keep,
    /// Remove the stored vector.
    Clear,
    /// Replace the stored vector with this one.
    Set(Embedding),
}

/// Counts of memories with and without a stored vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmbeddingStats {
    /// Number of rows with a non-null vector.
    pub with_vector: u64,
    /// Number of rows with no vector.
    pub without_vector: u64,
}

/// The SQLite-backed store.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (creating if necessary) a database file at `path` and ensures
    /// the schema exists.
    #[instrument(skip(path))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(StorageError::Sqlite)?;
        Self::from_connection(conn)
    }

    /// Opens a private, in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StorageError::Sqlite)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(StorageError::Sqlite)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(StorageError::Sqlite)?;
        conn.execute(schema::CREATE_MEMORIES_TABLE, [])
            .map_err(StorageError::Sqlite)?;
        conn.execute(schema::CREATE_MEMORIES_FTS_TABLE, [])
            .map_err(StorageError::Sqlite)?;
        conn.execute(schema::CREATE_MEMORIES_VECTORS_TABLE, [])
            .map_err(StorageError::Sqlite)?;
        conn.execute(schema::CREATE_DB_META_TABLE, [])
            .map_err(StorageError::Sqlite)?;
        conn.execute(schema::CREATE_TYPE_INDEX, [])
            .map_err(StorageError::Sqlite)?;
        conn.execute(schema::CREATE_CREATED_AT_INDEX, [])
            .map_err(StorageError::Sqlite)?;
        conn.execute(
            "INSERT OR IGNORE INTO db_meta (key, value) VALUES (?1, ?2)",
            params![schema::SCHEMA_VERSION_KEY, schema::SCHEMA_VERSION.to_string()],
        )
        .map_err(StorageError::Sqlite)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ------------------------------------------------------------------
    // Dimension pinning
    // ------------------------------------------------------------------

    /// Returns the dimension pinned for this database, if any vector has
    /// ever been accepted.
    pub fn pinned_dimension(&self) -> Result<Option<usize>> {
        let conn = self.lock();
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM db_meta WHERE key = ?1",
                params![schema::VECTOR_DIM_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::Sqlite)?;
        Ok(value.and_then(|v| v.parse::<usize>().ok()))
    }

    /// Pins `dim` as the database's vector dimension if none is pinned yet;
    /// otherwise validates that `dim` matches the pinned value.
    fn ensure_dimension(conn: &Connection, dim: usize) -> Result<()> {
        let existing: Option<String> = conn
            .query_row(
                "SELECT value FROM db_meta WHERE key = ?1",
                params![schema::VECTOR_DIM_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::Sqlite)?;
        match existing {
            None => {
                conn.execute(
                    "INSERT INTO db_meta (key, value) VALUES (?1, ?2)",
                    params![schema::VECTOR_DIM_KEY, dim.to_string()],
                )
                .map_err(StorageError::Sqlite)?;
                Ok(())
            }
            Some(raw) => {
                let pinned: usize = raw.parse().map_err(|_| {
                    StorageError::IndexDesync(format!("db_meta.vector_dim is not numeric: {raw:?}"))
                })?;
                if pinned != dim {
                    return Err(ValidationError::dimension_mismatch(pinned, dim).into());
                }
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Inserts a new memory, generating a random id.
    ///
    /// If `dedup_threshold` is `Some` and `vector` is `Some`, candidates of
    /// the same `type` are searched for a near-duplicate; if one clears the
    /// threshold its content/metadata/vector are updated in place instead
    /// of creating a new row.
    #[instrument(skip(self, content, metadata, vector))]
    pub fn insert(
        &self,
        content: String,
        metadata: Json,
        vector: Option<Embedding>,
        dedup_threshold: Option<f32>,
    ) -> Result<InsertOutcome> {
        self.insert_inner(MemoryId::new(), content, metadata, vector, dedup_threshold, false, None, None)
    }

    /// Inserts a new memory under a caller-supplied id.
    ///
    /// For import: `created_at`/`updated_at` override the timestamps that
    /// would otherwise default to now, so a round-tripped export preserves
    /// its original history. Fails with [`MemoriError::Conflict`] if the id
    /// already exists.
    #[instrument(skip(self, content, metadata, vector))]
    pub fn insert_with_id(
        &self,
        id: MemoryId,
        content: String,
        metadata: Json,
        vector: Option<Embedding>,
        dedup_threshold: Option<f32>,
        created_at: Option<Timestamp>,
        updated_at: Option<Timestamp>,
    ) -> Result<InsertOutcome> {
        self.insert_inner(id, content, metadata, vector, dedup_threshold, true, created_at, updated_at)
    }

    fn insert_inner(
        &self,
        id: MemoryId,
        content: String,
        metadata: Json,
        vector: Option<Embedding>,
        dedup_threshold: Option<f32>,
        explicit_id: bool,
        created_at: Option<Timestamp>,
        updated_at: Option<Timestamp>,
    ) -> Result<InsertOutcome> {
        if content.is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }
        if !metadata.is_object() && !metadata.is_null() {
            return Err(ValidationError::InvalidMetadata(
                "metadata must be a JSON object or null".to_string(),
            )
            .into());
        }

        let mut conn = self.lock();
        let tx = conn.transaction().map_err(StorageError::Sqlite)?;

        if explicit_id {
            let exists: bool = tx
                .query_row(
                    "SELECT 1 FROM memories WHERE id = ?1",
                    params![id.to_string()],
                    |_| Ok(true),
                )
                .optional()
                .map_err(StorageError::Sqlite)?
                .unwrap_or(false);
            if exists {
                return Err(MemoriError::Conflict(id.to_string()));
            }
        }

        if let Some(v) = &vector {
            Self::ensure_dimension(&tx, v.len())?;
        }

        let memory_type = metadata.get("type").and_then(Json::as_str).map(str::to_string);

        if let (Some(v), Some(threshold)) = (&vector, dedup_threshold) {
            if let Some(mtype) = &memory_type {
                let candidates = Self::candidates_for_dedup_tx(&tx, mtype, None)?;
                if let Some(matched) = dedup::find_merge_target(v, &candidates, threshold) {
                    // A dedup hit only rewrites content and bumps `updated_at`;
                    // the existing row's metadata and stored vector are left
                    // untouched.
                    Self::update_row(&tx, matched.id, Some(content), None, VectorUpdate::Keep, false)?;
                    tx.commit().map_err(StorageError::Sqlite)?;
                    return Ok(InsertOutcome {
                        id: matched.id,
                        action: InsertAction::Deduplicated,
                    });
                }
            }
        }

        let now = Timestamp::now();
        let created = created_at.unwrap_or(now);
        let updated = updated_at.unwrap_or(now);
        let metadata_text = serde_json::to_string(&metadata).map_err(|e| {
            StorageError::CorruptMetadata(id.to_string(), e)
        })?;

        tx.execute(
            "INSERT INTO memories (id, content, metadata, created_at, updated_at, last_accessed, access_count)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, 0)",
            params![id.to_string(), content, metadata_text, created.as_secs(), updated.as_secs()],
        )
        .map_err(StorageError::Sqlite)?;

        let rowid = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO memories_fts (rowid, content) VALUES (?1, ?2)",
            params![rowid, content],
        )
        .map_err(StorageError::Sqlite)?;

        if let Some(v) = &vector {
            tx.execute(
                "INSERT INTO memories_vectors (id, dim, vector) VALUES (?1, ?2, ?3)",
                params![id.to_string(), v.len() as i64, schema::encode_vector(v)],
            )
            .map_err(StorageError::Sqlite)?;
        }

        tx.commit().map_err(StorageError::Sqlite)?;
        Ok(InsertOutcome {
            id,
            action: InsertAction::Created,
        })
    }

    /// Shallow-merges `overlay` into `base`, last-writer-wins, per key. If
    /// either side isn't a JSON object, `overlay` replaces `base` wholesale
    /// (there is nothing sensible to merge key-by-key).
    fn merge_metadata(base: Json, overlay: Json) -> Json {
        match (base, overlay) {
            (Json::Object(mut base_map), Json::Object(overlay_map)) => {
                for (k, v) in overlay_map {
                    base_map.insert(k, v);
                }
                Json::Object(base_map)
            }
            (_, overlay) => overlay,
        }
    }

    fn update_row(
        conn: &Connection,
        id: MemoryId,
        content: Option<String>,
        metadata: Option<Json>,
        vector: VectorUpdate,
        merge_metadata: bool,
    ) -> Result<()> {
        let now = Timestamp::now();
        let rowid: i64 = conn
            .query_row(
                "SELECT rowid FROM memories WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .map_err(StorageError::Sqlite)?;

        if let Some(new_content) = &content {
            let old_content: String = conn
                .query_row(
                    "SELECT content FROM memories WHERE rowid = ?1",
                    params![rowid],
                    |row| row.get(0),
                )
                .map_err(StorageError::Sqlite)?;
            conn.execute(
                "INSERT INTO memories_fts (memories_fts, rowid, content) VALUES ('delete', ?1, ?2)",
                params![rowid, old_content],
            )
            .map_err(StorageError::Sqlite)?;
            conn.execute(
                "INSERT INTO memories_fts (rowid, content) VALUES (?1, ?2)",
                params![rowid, new_content],
            )
            .map_err(StorageError::Sqlite)?;
            conn.execute(
                "UPDATE memories SET content = ?1, updated_at = ?2 WHERE rowid = ?3",
                params![new_content, now.as_secs(), rowid],
            )
            .map_err(StorageError::Sqlite)?;
        }

        if let Some(new_metadata) = metadata {
            let final_metadata = if merge_metadata {
                let existing_text: String = conn
                    .query_row(
                        "SELECT metadata FROM memories WHERE rowid = ?1",
                        params![rowid],
                        |row| row.get(0),
                    )
                    .map_err(StorageError::Sqlite)?;
                let existing: Json = serde_json::from_str(&existing_text)
                    .map_err(|e| StorageError::CorruptMetadata(id.to_string(), e))?;
                Self::merge_metadata(existing, new_metadata)
            } else {
                new_metadata
            };
            let metadata_text = serde_json::to_string(&final_metadata)
                .map_err(|e| StorageError::CorruptMetadata(id.to_string(), e))?;
            conn.execute(
                "UPDATE memories SET metadata = ?1, updated_at = ?2 WHERE rowid = ?3",
                params![metadata_text, now.as_secs(), rowid],
            )
            .map_err(StorageError::Sqlite)?;
        }

        match vector {
            VectorUpdate::Keep => {}
            VectorUpdate::Clear => {
                conn.execute(
                    "DELETE FROM memories_vectors WHERE id = ?1",
                    params![id.to_string()],
                )
                .map_err(StorageError::Sqlite)?;
                conn.execute(
                    "UPDATE memories SET updated_at = ?1 WHERE rowid = ?2",
                    params![now.as_secs(), rowid],
                )
                .map_err(StorageError::Sqlite)?;
            }
            VectorUpdate::Set(v) => {
                Self::ensure_dimension(conn, v.len())?;
                conn.execute(
                    "INSERT INTO memories_vectors (id, dim, vector) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET dim = excluded.dim, vector = excluded.vector",
                    params![id.to_string(), v.len() as i64, schema::encode_vector(&v)],
                )
                .map_err(StorageError::Sqlite)?;
                conn.execute(
                    "UPDATE memories SET updated_at = ?1 WHERE rowid = ?2",
                    params![now.as_secs(), rowid],
                )
                .map_err(StorageError::Sqlite)?;
            }
        }

        Ok(())
    }

    /// Updates content, metadata, and/or vector of an existing memory.
    ///
    /// `id_or_prefix` must resolve to exactly one row; ambiguous or
    /// unmatched prefixes are errors. When `metadata` is given,
    /// `merge_metadata=true` shallow-merges it into the existing metadata
    /// object (later keys win); `merge_metadata=false` replaces it wholesale.
    #[instrument(skip(self, content, metadata, vector))]
    pub fn update(
        &self,
        id_or_prefix: &str,
        content: Option<String>,
        metadata: Option<Json>,
        vector: VectorUpdate,
        merge_metadata: bool,
    ) -> Result<Memory> {
        if let Some(c) = &content {
            if c.is_empty() {
                return Err(ValidationError::EmptyContent.into());
            }
        }
        if let Some(m) = &metadata {
            if !m.is_object() && !m.is_null() {
                return Err(ValidationError::InvalidMetadata(
                    "metadata must be a JSON object or null".to_string(),
                )
                .into());
            }
        }

        let mut conn = self.lock();
        let tx = conn.transaction().map_err(StorageError::Sqlite)?;
        let id = Self::resolve_required_tx(&tx, id_or_prefix)?;
        Self::update_row(&tx, id, content, metadata, vector, merge_metadata)?;
        let memory = Self::fetch_one(&tx, id, true)?
            .ok_or_else(|| MemoriError::not_found(id.to_string()))?;
        tx.commit().map_err(StorageError::Sqlite)?;
        Ok(memory)
    }

    /// Permanently deletes a memory.
    ///
    /// Returns `Ok(true)` if a row was removed. `id_or_prefix` must resolve
    /// to exactly one row; both unmatched and ambiguous prefixes are errors,
    /// matching `update`'s resolution rules.
    #[instrument(skip(self))]
    pub fn delete(&self, id_or_prefix: &str) -> Result<bool> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(StorageError::Sqlite)?;
        let id = Self::resolve_required_tx(&tx, id_or_prefix)?;

        let rowid: i64 = tx
            .query_row(
                "SELECT rowid FROM memories WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .map_err(StorageError::Sqlite)?;
        let content: String = tx
            .query_row(
                "SELECT content FROM memories WHERE rowid = ?1",
                params![rowid],
                |row| row.get(0),
            )
            .map_err(StorageError::Sqlite)?;

        tx.execute(
            "INSERT INTO memories_fts (memories_fts, rowid, content) VALUES ('delete', ?1, ?2)",
            params![rowid, content],
        )
        .map_err(StorageError::Sqlite)?;
        tx.execute("DELETE FROM memories_vectors WHERE id = ?1", params![id.to_string()])
            .map_err(StorageError::Sqlite)?;
        let changed = tx
            .execute("DELETE FROM memories WHERE id = ?1", params![id.to_string()])
            .map_err(StorageError::Sqlite)?;

        tx.commit().map_err(StorageError::Sqlite)?;
        Ok(changed > 0)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Resolves `id_or_prefix`, increments its access counter and stamps
    /// `last_accessed`, and returns the *pre-increment* snapshot.
    #[instrument(skip(self))]
    pub fn get(&self, id_or_prefix: &str) -> Result<Option<Memory>> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(StorageError::Sqlite)?;
        let Some(id) = Self::resolve_tolerant_tx(&tx, id_or_prefix)? else {
            return Ok(None);
        };
        let Some(snapshot) = Self::fetch_one(&tx, id, true)? else {
            return Ok(None);
        };
        let now = Timestamp::now();
        tx.execute(
            "UPDATE memories SET access_count = access_count + 1, last_accessed = ?1 WHERE id = ?2",
            params![now.as_secs(), id.to_string()],
        )
        .map_err(StorageError::Sqlite)?;
        tx.commit().map_err(StorageError::Sqlite)?;
        Ok(Some(snapshot))
    }

    /// Resolves and reads a memory without touching access tracking.
    #[instrument(skip(self))]
    pub fn get_readonly(&self, id_or_prefix: &str) -> Result<Option<Memory>> {
        let conn = self.lock();
        let Some(id) = Self::resolve_tolerant_tx(&conn, id_or_prefix)? else {
            return Ok(None);
        };
        Self::fetch_one(&conn, id, true)
    }

    fn fetch_one(conn: &Connection, id: MemoryId, include_vector: bool) -> Result<Option<Memory>> {
        let row = conn
            .query_row(
                "SELECT id, content, metadata, created_at, updated_at, last_accessed, access_count
                 FROM memories WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, Option<f64>>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()
            .map_err(StorageError::Sqlite)?;

        let Some((id_str, content, metadata_text, created_at, updated_at, last_accessed, access_count)) = row else {
            return Ok(None);
        };

        let metadata: Json = serde_json::from_str(&metadata_text)
            .map_err(|e| StorageError::CorruptMetadata(id_str.clone(), e))?;

        let vector = if include_vector {
            Self::fetch_vector(conn, id)?
        } else {
            None
        };

        Ok(Some(Memory {
            id,
            content,
            metadata,
            vector,
            created_at: Timestamp::from_secs(created_at),
            updated_at: Timestamp::from_secs(updated_at),
            last_accessed: last_accessed.map(Timestamp::from_secs),
            access_count: access_count as u64,
        }))
    }

    fn fetch_vector(conn: &Connection, id: MemoryId) -> Result<Option<Embedding>> {
        let bytes: Option<Vec<u8>> = conn
            .query_row(
                "SELECT vector FROM memories_vectors WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::Sqlite)?;
        Ok(bytes.and_then(|b| schema::decode_vector(&b)))
    }

    // ------------------------------------------------------------------
    // Prefix resolution
    // ------------------------------------------------------------------

    /// Resolves `id_or_prefix` against stored ids.
    pub fn resolve_prefix(&self, id_or_prefix: &str) -> Result<Resolution> {
        let conn = self.lock();
        Self::resolve_prefix_tx(&conn, id_or_prefix)
    }

    /// Resolves `id_or_prefix` to exactly one id, or errors
    /// ([`MemoriError::NotFound`] / [`MemoriError::Ambiguous`]).
    pub fn resolve_required(&self, id_or_prefix: &str) -> Result<MemoryId> {
        let conn = self.lock();
        Self::resolve_required_tx(&conn, id_or_prefix)
    }

    fn resolve_prefix_tx(conn: &Connection, id_or_prefix: &str) -> Result<Resolution> {
        let mut stmt = conn
            .prepare("SELECT id FROM memories WHERE id LIKE ?1 || '%' LIMIT 2")
            .map_err(StorageError::Sqlite)?;
        let candidates: Vec<MemoryId> = stmt
            .query_map(params![id_or_prefix], |row| row.get::<_, String>(0))
            .map_err(StorageError::Sqlite)?
            .filter_map(|r| r.ok())
            .filter_map(|s| MemoryId::parse(&s))
            .collect();
        Ok(id_resolve::resolve(&candidates))
    }

    fn resolve_required_tx(conn: &Connection, id_or_prefix: &str) -> Result<MemoryId> {
        match Self::resolve_prefix_tx(conn, id_or_prefix)? {
            Resolution::Found(id) => Ok(id),
            Resolution::NotFound => Err(MemoriError::not_found(id_or_prefix)),
            Resolution::Ambiguous => {
                let count = Self::count_prefix_matches(conn, id_or_prefix)?;
                Err(MemoriError::ambiguous(id_or_prefix, count))
            }
        }
    }

    fn resolve_tolerant_tx(conn: &Connection, id_or_prefix: &str) -> Result<Option<MemoryId>> {
        match Self::resolve_prefix_tx(conn, id_or_prefix)? {
            Resolution::Found(id) => Ok(Some(id)),
            Resolution::NotFound | Resolution::Ambiguous => Ok(None),
        }
    }

    fn count_prefix_matches(conn: &Connection, id_or_prefix: &str) -> Result<usize> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memories WHERE id LIKE ?1 || '%'",
                params![id_or_prefix],
                |row| row.get(0),
            )
            .map_err(StorageError::Sqlite)?;
        Ok(count as usize)
    }

    // ------------------------------------------------------------------
    // Dedup candidates
    // ------------------------------------------------------------------

    /// Fetches same-`type` candidates with a stored vector, in id order,
    /// for dedup scanning.
    pub fn candidates_for_dedup(
        &self,
        memory_type: &str,
        exclude_id: Option<MemoryId>,
    ) -> Result<Vec<Candidate>> {
        let conn = self.lock();
        Self::candidates_for_dedup_tx(&conn, memory_type, exclude_id)
    }

    fn candidates_for_dedup_tx(
        conn: &Connection,
        memory_type: &str,
        exclude_id: Option<MemoryId>,
    ) -> Result<Vec<Candidate>> {
        let mut stmt = conn
            .prepare(
                "SELECT m.id, v.vector FROM memories m
                 JOIN memories_vectors v ON v.id = m.id
                 WHERE json_extract(m.metadata, '$.type') = ?1
                 ORDER BY m.id",
            )
            .map_err(StorageError::Sqlite)?;
        let rows: Vec<(String, Vec<u8>)> = stmt
            .query_map(params![memory_type], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(StorageError::Sqlite)?
            .filter_map(|r| r.ok())
            .collect();

        let mut candidates = Vec::with_capacity(rows.len());
        for (id_str, bytes) in rows {
            let Some(id) = MemoryId::parse(&id_str) else {
                continue;
            };
            if Some(id) == exclude_id {
                continue;
            }
            if let Some(vector) = schema::decode_vector(&bytes) {
                candidates.push(Candidate { id, vector });
            }
        }
        Ok(candidates)
    }

    // ------------------------------------------------------------------
    // Ranking: vector and text sides of hybrid search
    // ------------------------------------------------------------------

    /// Builds `WHERE`-clause fragments and their bound values for an
    /// optional metadata equality `filter` (a JSON object: every key must be
    /// present with a JSON-equal value) and an optional `created_at` date
    /// range, with column references prefixed by `prefix` (e.g. `"m."` for
    /// queries that join `memories` under an alias).
    ///
    /// Each filter key is compared via `json_extract(metadata, '$."key"')
    /// IS json_extract(?, '$')`: binding the filter value as its own JSON
    /// document and extracting it back lets SQLite's own JSON typing decide
    /// equality, so string/number/bool/object/array filter values all
    /// compare correctly without per-type branching here.
    fn metadata_date_predicate(
        prefix: &str,
        filter: Option<&Json>,
        before: Option<Timestamp>,
        after: Option<Timestamp>,
    ) -> Result<(Vec<String>, Vec<rusqlite::types::Value>)> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(filter) = filter {
            let map = filter.as_object().ok_or_else(|| {
                ValidationError::InvalidMetadata("filter must be a JSON object".to_string())
            })?;
            for (key, value) in map {
                if key.contains('"') || key.contains('\\') {
                    return Err(ValidationError::InvalidMetadata(format!(
                        "invalid filter key: {key:?}"
                    ))
                    .into());
                }
                clauses.push(format!("json_extract({prefix}metadata, '$.\"{key}\"') IS json_extract(?, '$')"));
                let value_text = serde_json::to_string(value)
                    .map_err(|e| StorageError::CorruptMetadata("filter".to_string(), e))?;
                values.push(rusqlite::types::Value::Text(value_text));
            }
        }
        if let Some(b) = before {
            clauses.push(format!("{prefix}created_at < ?"));
            values.push(rusqlite::types::Value::Real(b.as_secs()));
        }
        if let Some(a) = after {
            clauses.push(format!("{prefix}created_at > ?"));
            values.push(rusqlite::types::Value::Real(a.as_secs()));
        }
        Ok((clauses, values))
    }

    /// Returns up to `k` ids ranked by cosine similarity to `query_vector`,
    /// best first, optionally restricted by a metadata `filter` and/or a
    /// `created_at` date range, and excluding one id (used by `related`).
    /// Each id is paired with its cosine similarity.
    #[instrument(skip(self, query_vector, filter))]
    pub fn vector_ranked(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: Option<&Json>,
        before: Option<Timestamp>,
        after: Option<Timestamp>,
        exclude_id: Option<MemoryId>,
    ) -> Result<Vec<(MemoryId, f32)>> {
        let conn = self.lock();
        let (clauses, values) = Self::metadata_date_predicate("m.", filter, before, after)?;
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT m.id, v.vector FROM memories m JOIN memories_vectors v ON v.id = m.id {where_clause}"
        );
        let mut stmt = conn.prepare(&sql).map_err(StorageError::Sqlite)?;
        let rows: Vec<(String, Vec<u8>)> = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(StorageError::Sqlite)?
            .filter_map(|r| r.ok())
            .collect();

        let mut scored: Vec<(MemoryId, f32)> = Vec::with_capacity(rows.len());
        for (id_str, bytes) in rows {
            let Some(id) = MemoryId::parse(&id_str) else { continue };
            if Some(id) == exclude_id {
                continue;
            }
            let Some(vector) = schema::decode_vector(&bytes) else { continue };
            let similarity = dedup::cosine_similarity(query_vector, &vector);
            scored.push((id, similarity));
        }
        scored.sort_by(|(id_a, a), (id_b, b)| {
            b.partial_cmp(a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| id_a.0.cmp(&id_b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Returns up to `k` ids ranked by FTS5 match quality against `query`,
    /// best first, optionally restricted by a metadata `filter` and/or a
    /// `created_at` date range. Each id is paired with its negated `bm25()`
    /// score (higher is better).
    #[instrument(skip(self, filter))]
    pub fn text_ranked(
        &self,
        query: &str,
        k: usize,
        filter: Option<&Json>,
        before: Option<Timestamp>,
        after: Option<Timestamp>,
    ) -> Result<Vec<(MemoryId, f64)>> {
        let conn = self.lock();
        let (clauses, extra_values) = Self::metadata_date_predicate("m.", filter, before, after)?;
        let mut where_clause = "WHERE f.content MATCH ?".to_string();
        for clause in &clauses {
            where_clause.push_str(" AND ");
            where_clause.push_str(clause);
        }
        let mut values = vec![rusqlite::types::Value::Text(query.to_string())];
        values.extend(extra_values);
        values.push(rusqlite::types::Value::Integer(k as i64));

        // bm25() is lower-is-better; negate so ORDER BY DESC is best-first.
        let sql = format!(
            "SELECT m.id, -bm25(f) AS score FROM memories m
             JOIN memories_fts f ON f.rowid = m.rowid
             {where_clause}
             ORDER BY score DESC, m.id ASC LIMIT ?"
        );
        let mut stmt = conn.prepare(&sql).map_err(StorageError::Sqlite)?;
        let rows: Vec<(String, f64)> = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })
            .map_err(StorageError::Sqlite)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows
            .into_iter()
            .filter_map(|(s, score)| MemoryId::parse(&s).map(|id| (id, score)))
            .collect())
    }

    /// Fetches full rows for a list of ids, preserving no particular order
    /// (callers re-order by their own ranking).
    pub fn fetch_many(&self, ids: &[MemoryId], include_vectors: bool) -> Result<HashMap<MemoryId, Memory>> {
        let conn = self.lock();
        let mut out = HashMap::with_capacity(ids.len());
        for &id in ids {
            if let Some(m) = Self::fetch_one(&conn, id, include_vectors)? {
                out.insert(id, m);
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Listing
    // ------------------------------------------------------------------

    /// Lists memories ordered by `sort`, descending, with `NULL`s last,
    /// optionally restricted to a `type` and/or a `created_at` date range.
    ///
    /// Pagination is `(sort key, id)` lexicographic, so a stable page
    /// boundary survives concurrent writes between calls.
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
        let filter = type_filter.map(|t| serde_json::json!({"type": t}));
        self.list_filtered(sort, limit, offset, filter.as_ref(), before, after, include_vectors)
    }

    /// Same as [`Store::list`] but takes a general metadata equality
    /// `filter` rather than just a `type` shorthand. Used internally by
    /// hybrid/text/vector search's empty-query fallback, which needs the
    /// same `filter`/`before`/`after` surface `search` exposes.
    #[instrument(skip(self, filter))]
    pub(crate) fn list_filtered(
        &self,
        sort: ListSort,
        limit: usize,
        offset: usize,
        filter: Option<&Json>,
        before: Option<Timestamp>,
        after: Option<Timestamp>,
        include_vectors: bool,
    ) -> Result<Vec<Memory>> {
        let conn = self.lock();
        let order_col = match sort {
            ListSort::Created => "created_at",
            ListSort::Updated => "updated_at",
            ListSort::Accessed => "last_accessed",
            ListSort::Count => "access_count",
        };
        // `order_col` only ever comes from the fixed match above, so it's
        // safe to splice directly; all caller-supplied values go through
        // bound parameters.
        let (clauses, mut values) = Self::metadata_date_predicate("", filter, before, after)?;
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        values.push(rusqlite::types::Value::Integer(limit as i64));
        values.push(rusqlite::types::Value::Integer(offset as i64));
        let sql = format!(
            "SELECT id FROM memories {where_clause}
             ORDER BY {order_col} IS NULL, {order_col} DESC, id ASC LIMIT ? OFFSET ?"
        );
        let mut stmt = conn.prepare(&sql).map_err(StorageError::Sqlite)?;
        let ids: Vec<MemoryId> = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), |row| row.get::<_, String>(0))
            .map_err(StorageError::Sqlite)?
            .filter_map(|r| r.ok())
            .filter_map(|s| MemoryId::parse(&s))
            .collect();

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(m) = Self::fetch_one(&conn, id, include_vectors)? {
                out.push(m);
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Counts memories, optionally restricted to a `type`.
    pub fn count(&self, type_filter: Option<&str>) -> Result<u64> {
        let conn = self.lock();
        let count: i64 = match type_filter {
            Some(t) => conn
                .query_row(
                    "SELECT COUNT(*) FROM memories WHERE json_extract(metadata, '$.type') = ?1",
                    params![t],
                    |row| row.get(0),
                )
                .map_err(StorageError::Sqlite)?,
            None => conn
                .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
                .map_err(StorageError::Sqlite)?,
        };
        Ok(count as u64)
    }

    /// Returns `(type, count)` pairs covering every distinct `type` value
    /// present in `metadata`, most common first.
    pub fn type_distribution(&self) -> Result<Vec<(String, u64)>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT COALESCE(json_extract(metadata, '$.type'), '') AS t, COUNT(*) AS c
                 FROM memories GROUP BY t ORDER BY c DESC, t ASC",
            )
            .map_err(StorageError::Sqlite)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(StorageError::Sqlite)?
            .filter_map(|r| r.ok())
            .map(|(t, c)| (t, c as u64))
            .collect();
        Ok(rows)
    }

    /// Counts memories with and without a stored vector.
    pub fn embedding_stats(&self) -> Result<EmbeddingStats> {
        let conn = self.lock();
        let with_vector: i64 = conn
            .query_row("SELECT COUNT(*) FROM memories_vectors", [], |row| row.get(0))
            .map_err(StorageError::Sqlite)?;
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
            .map_err(StorageError::Sqlite)?;
        Ok(EmbeddingStats {
            with_vector: with_vector as u64,
            without_vector: (total - with_vector).max(0) as u64,
        })
    }

    /// Returns up to `limit` `(id, content)` pairs for rows with no stored
    /// vector, for backfilling.
    pub fn rows_missing_vector(&self, limit: usize) -> Result<Vec<(MemoryId, String)>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT m.id, m.content FROM memories m
                 LEFT JOIN memories_vectors v ON v.id = m.id
                 WHERE v.id IS NULL ORDER BY m.id LIMIT ?1",
            )
            .map_err(StorageError::Sqlite)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(StorageError::Sqlite)?
            .filter_map(|r| r.ok())
            .filter_map(|(id, content)| MemoryId::parse(&id).map(|id| (id, content)))
            .collect();
        Ok(rows)
    }

    /// Sets the vector for an existing row, pinning the database dimension
    /// if this is the first vector ever accepted.
    pub fn set_vector(&self, id: MemoryId, vector: &[f32]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(StorageError::Sqlite)?;
        Self::update_row(&tx, id, None, None, VectorUpdate::Set(vector.to_vec()), false)?;
        tx.commit().map_err(StorageError::Sqlite)?;
        Ok(())
    }

    /// Overwrites the access-tracking columns directly, bypassing the
    /// normal read-increments-count path. Used when restoring memories
    /// from an export that carried their original access stats.
    pub fn set_access_stats(&self, id: MemoryId, access_count: u64, last_accessed: Timestamp) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE memories SET access_count = ?1, last_accessed = ?2 WHERE id = ?3",
            params![access_count as i64, last_accessed.as_secs(), id.to_string()],
        )
        .map_err(StorageError::Sqlite)?;
        Ok(())
    }

    /// Deletes all memories with `created_at < before`, optionally
    /// restricted to a `type`. Returns the number of rows deleted.
    #[instrument(skip(self))]
    pub fn delete_before(&self, before: Timestamp, type_filter: Option<&str>) -> Result<u64> {
        let conn = self.lock();
        let targets: Vec<(String, i64, String)> = match type_filter {
            Some(t) => {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, rowid, content FROM memories
                         WHERE created_at < ?1 AND json_extract(metadata, '$.type') = ?2",
                    )
                    .map_err(StorageError::Sqlite)?;
                stmt.query_map(params![before.as_secs(), t], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })
                .map_err(StorageError::Sqlite)?
                .filter_map(|r| r.ok())
                .collect()
            }
            None => {
                let mut stmt = conn
                    .prepare("SELECT id, rowid, content FROM memories WHERE created_at < ?1")
                    .map_err(StorageError::Sqlite)?;
                stmt.query_map(params![before.as_secs()], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })
                .map_err(StorageError::Sqlite)?
                .filter_map(|r| r.ok())
                .collect()
            }
        };
        Self::delete_rows(&conn, targets)
    }

    /// Deletes all memories of the given `type`. Returns the number of
    /// rows deleted.
    #[instrument(skip(self))]
    pub fn delete_by_type(&self, memory_type: &str) -> Result<u64> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT id, rowid, content FROM memories WHERE json_extract(metadata, '$.type') = ?1")
            .map_err(StorageError::Sqlite)?;
        let targets: Vec<(String, i64, String)> = stmt
            .query_map(params![memory_type], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .map_err(StorageError::Sqlite)?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);
        Self::delete_rows(&conn, targets)
    }

    fn delete_rows(conn: &Connection, targets: Vec<(String, i64, String)>) -> Result<u64> {
        let mut deleted = 0u64;
        for (id, rowid, content) in targets {
            conn.execute(
                "INSERT INTO memories_fts (memories_fts, rowid, content) VALUES ('delete', ?1, ?2)",
                params![rowid, content],
            )
            .map_err(StorageError::Sqlite)?;
            conn.execute("DELETE FROM memories_vectors WHERE id = ?1", params![id])
                .map_err(StorageError::Sqlite)?;
            conn.execute("DELETE FROM memories WHERE id = ?1", params![id])
                .map_err(StorageError::Sqlite)?;
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Runs `VACUUM` to reclaim space after large deletes.
    #[instrument(skip(self))]
    pub fn vacuum(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute("VACUUM", []).map_err(StorageError::Sqlite)?;
        Ok(())
    }
}
