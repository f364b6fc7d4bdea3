//! Core type definitions: memory identifiers and timestamps.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Memory identifier — a 36-character UUID string.
///
/// Ids are generated with UUID v4 on create unless the caller supplies
/// one via [`crate::Memori::insert_with_id`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Creates a new random `MemoryId`.
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a full 36-character UUID string into a `MemoryId`.
    ///
    /// Returns `None` if `s` is not a valid UUID (use
    /// [`crate::id_resolve::resolve`] for prefix lookups instead).
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unix timestamp in fractional seconds (Unix epoch seconds, as a float).
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Timestamp(pub f64);

impl Timestamp {
    /// Returns a timestamp for the current moment.
    ///
    /// If the system clock is before the Unix epoch (should never happen
    /// in practice), returns epoch (0.0) rather than panicking.
    #[inline]
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_secs_f64())
    }

    /// Wraps a raw Unix-epoch-seconds value.
    #[inline]
    pub const fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    /// Returns the timestamp as Unix epoch seconds.
    #[inline]
    pub const fn as_secs(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Embedding vector type alias — a dense `f32` vector of fixed dimension D.
pub type Embedding = Vec<f32>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_id_new_is_unique() {
        let a = MemoryId::new();
        let b = MemoryId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_memory_id_display_is_36_chars() {
        let id = MemoryId::new();
        assert_eq!(id.to_string().len(), 36);
    }

    #[test]
    fn test_memory_id_parse_roundtrip() {
        let id = MemoryId::new();
        let parsed = MemoryId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_memory_id_parse_rejects_garbage() {
        assert!(MemoryId::parse("not-a-uuid").is_none());
    }

    #[test]
    fn test_timestamp_ordering() {
        let a = Timestamp::from_secs(1.0);
        let b = Timestamp::from_secs(2.0);
        assert!(a < b);
    }

    #[test]
    fn test_timestamp_now_advances() {
        let a = Timestamp::now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = Timestamp::now();
        assert!(b.as_secs() >= a.as_secs());
    }
}
