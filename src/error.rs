//! Error types for memori.
//!
//! memori uses a two-level error system:
//! - [`MemoriError`] is the top-level error returned by all public APIs
//! - [`StorageError`] and [`ValidationError`] provide detail for the two
//!   most common failure families
//!
//! # Error Handling Pattern
//! ```rust,ignore
//! use memori::{Memori, Config, Result};
//!
//! fn example() -> Result<()> {
//!     let db = Memori::open("./memori.db", Config::default())?;
//!     // ... operations that may fail ...
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Result type alias for memori operations.
pub type Result<T> = std::result::Result<T, MemoriError>;

/// Top-level error enum for all memori operations.
///
/// This is the only error type returned by public APIs. Use pattern
/// matching or the `is_*` helpers to handle specific cases.
#[derive(Debug, Error)]
pub enum MemoriError {
    /// No row matches the given id or a resolved prefix where exactly one
    /// was required.
    #[error("memory not found: {0}")]
    NotFound(String),

    /// A prefix matched more than one id during a mutation.
    #[error("ambiguous id prefix {prefix:?}: matches {count} memories")]
    Ambiguous {
        /// The prefix that was given.
        prefix: String,
        /// How many ids it matched.
        count: usize,
    },

    /// `related` was called on a row without a stored vector.
    #[error("memory {0} has no embedding")]
    NoEmbedding(String),

    /// A code path needed auto-embedding but no embedder was configured
    /// and no caller-supplied vector was given.
    #[error("no embedder available and no vector was supplied")]
    EmbedderUnavailable,

    /// `insert_with_id` was given an id that already exists.
    #[error("memory {0} already exists")]
    Conflict(String),

    /// Input validation error (empty content, bad JSON, dimension mismatch, ...).
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Underlying storage engine error (I/O, corruption, transaction failure).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Embedder port returned an error while generating a vector.
    #[error("embedding error: {0}")]
    Embedding(String),
}

impl MemoriError {
    /// Creates a not-found error for the given id or prefix.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Creates an ambiguous-prefix error.
    pub fn ambiguous(prefix: impl Into<String>, count: usize) -> Self {
        Self::Ambiguous {
            prefix: prefix.into(),
            count,
        }
    }

    /// Creates an embedding error with the given message.
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Returns true if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this is an ambiguous-prefix error.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous { .. })
    }

    /// Returns true if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a storage error.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Storage-related errors.
///
/// These indicate problems with the underlying SQLite engine rather than
/// with caller-supplied data.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Error returned directly by `rusqlite` / the SQLite engine.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// General I/O error (opening the database file, resolving the default path, ...).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The `memories` row, its FTS5 shadow entry, or its vector sidecar
    /// entry were found out of sync with each other. Should never happen
    /// if all writes go through `Store`.
    #[error("index out of sync for memory {0}")]
    IndexDesync(String),

    /// Stored metadata JSON failed to parse back into a JSON value. This
    /// indicates on-disk corruption, since metadata is only ever written
    /// through `Store` after canonical re-serialization.
    #[error("corrupt metadata for memory {0}: {1}")]
    CorruptMetadata(String, serde_json::Error),
}

/// Validation errors for caller-supplied input.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// `content` was empty.
    #[error("content must not be empty")]
    EmptyContent,

    /// A supplied vector's length didn't match the database's fixed
    /// embedding dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimension fixed by the database (from the first vector ever inserted).
        expected: usize,
        /// Dimension of the vector that was supplied.
        got: usize,
    },

    /// Metadata was not a JSON object (or failed to parse).
    #[error("metadata must be a JSON object: {0}")]
    InvalidMetadata(String),

    /// `before`/`after` formed an empty or otherwise invalid date range.
    #[error("invalid date range: after ({after}) must be <= before ({before})")]
    InvalidDateRange {
        /// The `after` bound, in Unix epoch seconds.
        after: f64,
        /// The `before` bound, in Unix epoch seconds.
        before: f64,
    },

    /// A field had an invalid value outside its documented constraint.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the invalid field.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },
}

impl ValidationError {
    /// Creates a dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, got: usize) -> Self {
        Self::DimensionMismatch { expected, got }
    }

    /// Creates an invalid-field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
