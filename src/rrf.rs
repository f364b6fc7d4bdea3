//! Reciprocal rank fusion: combines a vector-ranked list and a text-ranked
//! list of candidates into a single fused ranking.
//!
//! Kept as a pure function, independent of storage, so its ordering and
//! tie-breaking can be tested directly against fixed input lists.

use crate::types::MemoryId;

/// Fuses two ranked candidate lists into one, by summing
/// `1 / (k + rank)` contributions from each list a candidate appears in.
///
/// `vector_ranked` and `text_ranked` are each ordered best-first (rank 0 is
/// the best match); a candidate absent from a list contributes 0 from that
/// side. Ties in the fused score are broken, in order, by: better vector
/// rank, then better text rank, then by id, so that fusing the same two
/// input lists always produces the same output order regardless of
/// iteration order or floating-point summation path.
///
/// Returns `(id, fused_score)` pairs ordered best-first.
pub fn fuse(vector_ranked: &[MemoryId], text_ranked: &[MemoryId], k: f64) -> Vec<(MemoryId, f64)> {
    use std::collections::HashMap;

    #[derive(Clone, Copy)]
    struct Entry {
        score: f64,
        vector_rank: Option<usize>,
        text_rank: Option<usize>,
    }

    let mut entries: HashMap<MemoryId, Entry> = HashMap::new();

    for (rank, id) in vector_ranked.iter().enumerate() {
        let e = entries.entry(*id).or_insert(Entry {
            score: 0.0,
            vector_rank: None,
            text_rank: None,
        });
        // `rank` is the 0-based index; the fusion formula's `r` is 1-based
        // (best match r=1), so the contribution uses `rank + 1`.
        e.score += 1.0 / (k + rank as f64 + 1.0);
        e.vector_rank = Some(rank);
    }

    for (rank, id) in text_ranked.iter().enumerate() {
        let e = entries.entry(*id).or_insert(Entry {
            score: 0.0,
            vector_rank: None,
            text_rank: None,
        });
        e.score += 1.0 / (k + rank as f64 + 1.0);
        e.text_rank = Some(rank);
    }

    let mut fused: Vec<(MemoryId, Entry)> = entries.into_iter().collect();
    fused.sort_by(|(id_a, a), (id_b, b)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                a.vector_rank
                    .unwrap_or(usize::MAX)
                    .cmp(&b.vector_rank.unwrap_or(usize::MAX))
            })
            .then_with(|| {
                a.text_rank
                    .unwrap_or(usize::MAX)
                    .cmp(&b.text_rank.unwrap_or(usize::MAX))
            })
            .then_with(|| id_a.0.cmp(&id_b.0))
    });

    fused.into_iter().map(|(id, e)| (id, e.score)).collect()
}
