//! Near-duplicate detection for writes.
//!
//! Dedup is scoped to same-`type` candidates with a stored vector: given a
//! new vector and a list of `(id, type, vector)` triples already in the
//! database, find the closest same-type neighbor by cosine similarity and
//! report whether it clears the merge threshold. There is no separate
//! hashing trick — the dedup key is simply `(type, nearest vector within
//! that type)`.

use crate::types::{Embedding, MemoryId};

/// A same-type candidate considered for deduplication.
#[derive(Clone, Debug)]
pub struct Candidate {
    /// The candidate's id.
    pub id: MemoryId,
    /// The candidate's stored vector.
    pub vector: Embedding,
}

/// Outcome of a dedup check: either no candidate cleared the threshold, or
/// the nearest one did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DedupMatch {
    /// The id of the matched (nearest, over-threshold) candidate.
    pub id: MemoryId,
    /// Its cosine similarity to the new vector.
    pub similarity: f32,
}

/// Computes cosine similarity between two equal-length vectors.
///
/// Returns `0.0` if either vector has zero magnitude (rather than
/// `NaN`), since a zero vector carries no directional information to
/// compare.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Finds the nearest candidate to `vector` among `candidates` and reports
/// whether it clears `threshold`.
///
/// Ties in similarity are broken by the candidates' input order (first
/// wins), which callers should make deterministic by fetching candidates
/// in a fixed (e.g. id-ordered) order.
///
/// `candidates` must already be restricted to rows of the same `type` as
/// the new memory and having a non-null vector — this function performs
/// no type filtering itself.
pub fn find_merge_target(
    vector: &[f32],
    candidates: &[Candidate],
    threshold: f32,
) -> Option<DedupMatch> {
    let mut best: Option<DedupMatch> = None;
    for candidate in candidates {
        let similarity = cosine_similarity(vector, &candidate.vector);
        let is_better = match &best {
            Some(current) => similarity > current.similarity,
            None => true,
        };
        if is_better {
            best = Some(DedupMatch {
                id: candidate.id,
                similarity,
            });
        }
    }
    best.filter(|m| m.similarity >= threshold)
}
