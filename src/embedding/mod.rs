//! The `Embedder` port: turns text into dense vectors.
//!
//! memori does not implement an embedding model itself: the engine calls
//! out to an `Embedder` port and leaves the choice of model to the host.
//! This module defines the trait any host-supplied embedding service must
//! implement, plus two trivial implementations used when no real model is
//! wired up: [`NullEmbedder`] (always unavailable) and, for tests,
//! [`DeterministicEmbedder`].
//!
//! # Implementing a Custom Provider
//!
//! ```rust
//! use memori::embedding::Embedder;
//! use memori::{Embedding, Result};
//!
//! struct MyEmbedder {
//!     dimension: usize,
//! }
//!
//! impl Embedder for MyEmbedder {
//!     fn embed(&self, text: &str) -> Result<Embedding> {
//!         Ok(vec![0.0; self.dimension]) // call your real model here
//!     }
//!
//!     fn dimension(&self) -> usize {
//!         self.dimension
//!     }
//! }
//! ```

use crate::error::Result;
use crate::types::Embedding;

/// Capability providing `embed(text) -> vector<f32>` and a fixed
/// `dimension()`.
///
/// Implementations must be `Send + Sync` since a host may call memori
/// from multiple threads.
pub trait Embedder: Send + Sync {
    /// Generates an embedding for `text`.
    ///
    /// The returned vector's length must equal [`Embedder::dimension`]
    /// and must be identical across calls for the same input within one
    /// process.
    ///
    /// # Errors
    /// Returns [`crate::MemoriError::Embedding`] if generation fails.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Returns the fixed dimension of vectors this embedder produces.
    fn dimension(&self) -> usize;
}

/// An embedder that is never available.
///
/// Used as the default when a host opens a database without configuring
/// a real embedding service. Any write without an explicit vector and
/// without `no_embed=true` fails with
/// [`crate::MemoriError::EmbedderUnavailable`]; any search with only
/// `text` falls back to text-only mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullEmbedder;

impl Embedder for NullEmbedder {
    fn embed(&self, _text: &str) -> Result<Embedding> {
        Err(crate::MemoriError::EmbedderUnavailable)
    }

    fn dimension(&self) -> usize {
        0
    }
}

/// A deterministic, content-hashing embedder for tests.
///
/// Not a real embedding model: it maps each input string to a fixed-size
/// vector derived from a simple rolling hash of its bytes, normalized to
/// unit length. Semantically similar strings are *not* guaranteed to map
/// to nearby vectors — callers that need a scenario where vector
/// similarity tracks meaning should construct explicit vectors instead
/// (see `tests/search.rs`).
#[derive(Clone, Copy, Debug)]
pub struct DeterministicEmbedder {
    dimension: usize,
}

impl DeterministicEmbedder {
    /// Creates a new deterministic embedder producing vectors of `dimension` length.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Embedder for DeterministicEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut state: u64 = 0xcbf2_9ce4_8422_2325;
        let mut vector = Vec::with_capacity(self.dimension);
        for i in 0..self.dimension {
            for &byte in text.as_bytes() {
                state ^= u64::from(byte);
                state = state.wrapping_mul(0x0000_0100_0000_01B3);
            }
            state ^= i as u64;
            state = state.wrapping_mul(0x0000_0100_0000_01B3);
            // Map the hash to a small signed float via its low bits.
            let v = ((state & 0xFFFF) as f32 / 65535.0) * 2.0 - 1.0;
            vector.push(v);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
