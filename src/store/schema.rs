//! SQLite schema definitions for the memory store.
//!
//! # Table Layout
//!
//! ```text
//! memories          id TEXT PRIMARY KEY, content, metadata (JSON text),
//!                    created_at, updated_at, last_accessed, access_count
//! memories_fts      FTS5 virtual table over `content`, external content
//!                    table = memories, content_rowid = memories.rowid
//! memories_vectors  id TEXT PRIMARY KEY, dim INTEGER, vector BLOB
//! db_meta           key TEXT PRIMARY KEY, value TEXT  (e.g. "vector_dim")
//! ```
//!
//! The FTS5 shadow table is kept in sync by explicit `INSERT`/`DELETE`
//! commands issued alongside `memories` writes in the same transaction,
//! rather than by SQL triggers — every write goes through [`crate::Store`]
//! anyway, so triggers would add indirection without adding safety.

/// Current schema version, stored in `db_meta` under key `"schema_version"`.
pub const SCHEMA_VERSION: i64 = 1;

/// `db_meta` key under which the pinned vector dimension is stored, once
/// the first non-null vector has ever been accepted.
pub const VECTOR_DIM_KEY: &str = "vector_dim";

/// `db_meta` key under which the schema version is stored.
pub const SCHEMA_VERSION_KEY: &str = "schema_version";

pub const CREATE_MEMORIES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS memories (
    id            TEXT PRIMARY KEY,
    content       TEXT NOT NULL,
    metadata      TEXT NOT NULL,
    created_at    REAL NOT NULL,
    updated_at    REAL NOT NULL,
    last_accessed REAL,
    access_count  INTEGER NOT NULL DEFAULT 0
)";

pub const CREATE_MEMORIES_FTS_TABLE: &str = "
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    content,
    content='memories',
    content_rowid='rowid'
)";

pub const CREATE_MEMORIES_VECTORS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS memories_vectors (
    id     TEXT PRIMARY KEY REFERENCES memories(id) ON DELETE CASCADE,
    dim    INTEGER NOT NULL,
    vector BLOB NOT NULL
)";

pub const CREATE_DB_META_TABLE: &str = "
CREATE TABLE IF NOT EXISTS db_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";

pub const CREATE_TYPE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_memories_type ON memories (json_extract(metadata, '$.type'))";

pub const CREATE_CREATED_AT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_memories_created_at ON memories (created_at)";

/// Serializes an `f32` vector to little-endian bytes for storage in a BLOB column.
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Deserializes a BLOB column back into an `f32` vector.
///
/// Returns `None` if `bytes` is not a whole number of 4-byte floats.
pub fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}
