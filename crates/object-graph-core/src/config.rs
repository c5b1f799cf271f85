//! Stream configuration.
//!
//! [`StreamConfig`] carries the tunable limits of one encode or decode
//! session. The defaults match the canonical wire behavior; the limits exist
//! so a hostile or corrupt stream cannot demand unbounded recursion or
//! allocation before the first inconsistency is detected.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Default block buffer capacity in bytes.
///
/// Custom-hook payload is gathered into blocks of at most this many bytes
/// before a length header is emitted.
pub const DEFAULT_BLOCK_CAPACITY: usize = 1024;

/// Default maximum recursion depth for the graph walkers.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Default ceiling for any single decoded allocation, in bytes for primitive
/// payloads and elements for reference arrays.
pub const DEFAULT_MAX_ALLOC: u64 = 64 * 1024 * 1024;

/// Tunable limits for one stream session.
///
/// # Examples
///
/// ```rust
/// use object_graph_core::config::StreamConfig;
///
/// let config = StreamConfig::default();
/// assert_eq!(config.block_capacity, 1024);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Block buffer capacity in bytes. Payload written by custom hooks is
    /// framed into blocks of at most this size.
    #[serde(default = "default_block_capacity")]
    pub block_capacity: usize,

    /// Maximum recursion depth for encode and decode walks. Exceeding it is
    /// a fatal error, not a panic.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Upper bound on any single allocation requested by a length prefix.
    /// Applies to text payloads and primitive array spans in bytes, and to
    /// reference arrays in elements.
    #[serde(default = "default_max_alloc")]
    pub max_alloc: u64,
}

fn default_block_capacity() -> usize {
    DEFAULT_BLOCK_CAPACITY
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_max_alloc() -> u64 {
    DEFAULT_MAX_ALLOC
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            block_capacity: DEFAULT_BLOCK_CAPACITY,
            max_depth: DEFAULT_MAX_DEPTH,
            max_alloc: DEFAULT_MAX_ALLOC,
        }
    }
}

impl StreamConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if:
    /// - `block_capacity` is zero or exceeds the 4-byte block header range
    /// - `max_depth` is zero
    /// - `max_alloc` is smaller than one block
    pub fn validate(&self) -> CoreResult<()> {
        if self.block_capacity == 0 {
            return Err(CoreError::Config(
                "block_capacity must be greater than 0".into(),
            ));
        }
        if self.block_capacity > u32::MAX as usize {
            return Err(CoreError::Config(format!(
                "block_capacity {} exceeds the 4-byte block header range",
                self.block_capacity
            )));
        }
        if self.max_depth == 0 {
            return Err(CoreError::Config("max_depth must be greater than 0".into()));
        }
        if self.max_alloc < self.block_capacity as u64 {
            return Err(CoreError::Config(format!(
                "max_alloc {} is smaller than block_capacity {}",
                self.max_alloc, self.block_capacity
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StreamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.block_capacity, DEFAULT_BLOCK_CAPACITY);
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(config.max_alloc, DEFAULT_MAX_ALLOC);
    }

    #[test]
    fn test_zero_block_capacity_rejected() {
        let config = StreamConfig {
            block_capacity: 0,
            ..StreamConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("block_capacity"));
    }

    #[test]
    fn test_zero_depth_rejected() {
        let config = StreamConfig {
            max_depth: 0,
            ..StreamConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_undersized_alloc_cap_rejected() {
        let config = StreamConfig {
            max_alloc: 16,
            ..StreamConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip_fills_defaults() {
        let config: StreamConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.block_capacity, DEFAULT_BLOCK_CAPACITY);

        let text = serde_json::to_string(&config).unwrap();
        let back: StreamConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.max_depth, config.max_depth);
    }
}
