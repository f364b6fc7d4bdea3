//! # memori
//!
//! An embedded memory store for AI agents: a single SQLite file combining
//! full-text search (FTS5), vector similarity, and reciprocal-rank-fused
//! hybrid search behind one small API.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use memori::{Memori, Config, InsertOptions, SearchQuery};
//! use serde_json::json;
//!
//! let db = Memori::open("./memori.db", Config::default())?
//!     .with_embedder(Box::new(my_embedder));
//!
//! db.insert(
//!     "the deploy pipeline retries three times before paging",
//!     json!({"type": "fact"}),
//!     InsertOptions::default(),
//! )?;
//!
//! let results = db.search(SearchQuery {
//!     text: Some("deploy retries".to_string()),
//!     limit: 5,
//!     ..Default::default()
//! })?;
//! ```
//!
//! ## Key Concepts
//!
//! ### Memory
//!
//! A **memory** is one stored row: free-text `content`, a JSON `metadata`
//! object (the `type` field scopes dedup and filtering), an optional
//! embedding `vector`, and access-tracking timestamps/counters maintained
//! automatically by [`Memori::get`].
//!
//! ### Search
//!
//! [`Memori::search`] dispatches to vector-only, text-only, or hybrid
//! search depending on what a [`SearchQuery`] supplies. Hybrid search fuses
//! both rankings with reciprocal rank fusion (see [`rrf`]).
//!
//! ### Embedder
//!
//! memori never generates embeddings itself. A host supplies one by
//! implementing [`embedding::Embedder`] and passing it to
//! [`Memori::with_embedder`]; without one, writes fail unless `no_embed` is
//! set and searches fall back to text-only.
//!
//! ## Thread Safety
//!
//! `Memori` is `Send + Sync` and can be shared across threads using `Arc`;
//! [`store::Store`] serializes access to its single connection internally.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

mod config;
mod db;
mod error;
mod io;
mod memory;
mod store;
mod types;

pub mod dedup;
pub mod embedding;
pub mod id_resolve;
pub mod rrf;

pub use config::{default_db_path, Config};
pub use db::{InsertOptions, Memori, SearchQuery};
pub use error::{MemoriError, Result, StorageError, ValidationError};
pub use io::{export_ndjson, import_ndjson, ImportSummary};
pub use memory::{InsertAction, InsertOutcome, ListSort, Memory, SearchResult};
pub use store::{EmbeddingStats, VectorUpdate};
pub use types::{Embedding, MemoryId, Timestamp};

/// Convenient imports for common memori usage.
///
/// ```rust
/// use memori::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::db::{InsertOptions, Memori, SearchQuery};
    pub use crate::embedding::Embedder;
    pub use crate::error::{MemoriError, Result};
    pub use crate::memory::{ListSort, Memory, SearchResult};
    pub use crate::types::{Embedding, MemoryId, Timestamp};
}
