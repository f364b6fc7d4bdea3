//! Configuration types for memori.
//!
//! The [`Config`] struct controls database behavior including:
//! - The default dedup threshold applied when a write asks to dedup
//!   without specifying its own threshold
//! - Reciprocal-rank fusion tuning (`rrf_k`, the hybrid candidate fan-out)
//! - Content size limits
//!
//! # Example
//! ```
//! use memori::Config;
//!
//! let config = Config::default();
//! assert_eq!(config.default_dedup_threshold, 0.92);
//! ```

use crate::error::ValidationError;

/// Database configuration options.
///
/// All fields have sensible defaults. Use struct update syntax to
/// override specific settings:
///
/// ```
/// use memori::Config;
///
/// let config = Config {
///     default_dedup_threshold: 0.95,
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Default cosine-similarity threshold used by the dedup pass when a
    /// write requests dedup without specifying its own threshold.
    pub default_dedup_threshold: f32,

    /// The `k` constant in reciprocal-rank fusion: `1 / (k + rank)`.
    pub rrf_k: f64,

    /// Multiplier applied to `limit` to compute the candidate fan-out `K`
    /// for each side of a hybrid search, floored at `hybrid_fanout_floor`.
    pub hybrid_fanout_multiplier: usize,

    /// Minimum candidate fan-out `K` for hybrid search, regardless of `limit`.
    pub hybrid_fanout_floor: usize,

    /// Maximum content size in bytes.
    pub max_content_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_dedup_threshold: 0.92,
            rrf_k: 60.0,
            hybrid_fanout_multiplier: 4,
            hybrid_fanout_floor: 50,
            max_content_size: 100 * 1024,
        }
    }
}

impl Config {
    /// Creates a new `Config` with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the configuration.
    ///
    /// Called automatically by [`crate::Memori::open`]. Can also be called
    /// explicitly to check configuration before attempting to open.
    ///
    /// # Errors
    /// Returns `ValidationError` if any tunable is out of its sane range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.default_dedup_threshold) {
            return Err(ValidationError::invalid_field(
                "default_dedup_threshold",
                "must be between 0.0 and 1.0",
            ));
        }
        if self.rrf_k <= 0.0 {
            return Err(ValidationError::invalid_field(
                "rrf_k",
                "must be greater than 0",
            ));
        }
        if self.hybrid_fanout_multiplier == 0 {
            return Err(ValidationError::invalid_field(
                "hybrid_fanout_multiplier",
                "must be greater than 0",
            ));
        }
        if self.max_content_size == 0 {
            return Err(ValidationError::invalid_field(
                "max_content_size",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Computes the hybrid candidate fan-out `K` for a given result `limit`.
    #[inline]
    pub fn hybrid_fanout(&self, limit: usize) -> usize {
        (limit * self.hybrid_fanout_multiplier).max(self.hybrid_fanout_floor)
    }
}

/// Returns the default database path convention: `~/.claude/memori.db`.
///
/// Returns `None` if the home directory cannot be resolved (e.g. no
/// `$HOME` on the current platform); callers should fall back to an
/// explicit path in that case.
pub fn default_db_path() -> Option<std::path::PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude").join("memori.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_dedup_threshold, 0.92);
        assert_eq!(config.rrf_k, 60.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_hybrid_fanout_floor() {
        let config = Config::default();
        assert_eq!(config.hybrid_fanout(5), 50); // 5*4=20, floored to 50
        assert_eq!(config.hybrid_fanout(20), 80); // 20*4=80
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let config = Config {
            default_dedup_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_rrf_k() {
        let config = Config {
            rrf_k: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_max_content_size() {
        let config = Config {
            max_content_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
