//! Resolves a caller-supplied id prefix against a small set of candidate
//! ids that share that prefix.
//!
//! The actual `WHERE id LIKE ?1 || '%'` lookup lives in [`crate::Store`]
//! (bounded to at most two rows, since this function only needs to tell
//! "exactly one" from "more than one" apart); this module just turns that
//! raw candidate list into a [`Resolution`].

use crate::types::MemoryId;

/// Result of resolving a prefix against stored ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one stored id starts with the given prefix.
    Found(MemoryId),
    /// No stored id starts with the given prefix.
    NotFound,
    /// More than one stored id starts with the given prefix.
    Ambiguous,
}

/// Resolves a prefix from a bounded list of candidate ids that start with
/// it.
///
/// `candidates` should contain at most the first two matches (callers use
/// `LIMIT 2` at the SQL layer) — this function does not re-check that the
/// ids actually share the prefix, it only counts.
pub fn resolve(candidates: &[MemoryId]) -> Resolution {
    match candidates {
        [] => Resolution::NotFound,
        [single] => Resolution::Found(*single),
        _ => Resolution::Ambiguous,
    }
}
