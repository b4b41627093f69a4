//! Configuration module for cachegate
//!
//! This module is organized into submodules:
//! - `defaults` - Default constants and values
//!
//! Configuration here covers only the framing core. Proxy-wide
//! configuration (route trees, pools) is supplied externally as an
//! immutable [`ProxyConfig`](crate::proxy::ProxyConfig).

mod defaults;

pub use defaults::*;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Per-connection parser configuration.
///
/// One `ParserConfig` is shared by every connection parser a server
/// creates; the values bound per-connection memory and control the
/// optional hardened-copy path.
///
/// # Example
///
/// ```rust
/// use cachegate::config::ParserConfig;
///
/// let config = ParserConfig::default();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Initial read buffer size per connection, in bytes
    pub initial_buffer_size: usize,

    /// Maximum read buffer size per connection, in bytes.
    ///
    /// Growth past this value is permitted transiently to fit a single
    /// oversized message.
    pub max_buffer_size: usize,

    /// Number of parsed messages between buffer-shrink considerations
    pub shrink_interval: u64,

    /// Copy fully-framed messages into a hardened arena before decode
    pub hardened_copy: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            initial_buffer_size: DEFAULT_INITIAL_BUFFER_SIZE,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            shrink_interval: DEFAULT_SHRINK_INTERVAL,
            hardened_copy: DEFAULT_HARDENED_COPY,
        }
    }
}

impl ParserConfig {
    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_buffer_size == 0 || self.max_buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        if self.initial_buffer_size > self.max_buffer_size {
            return Err(ConfigError::InitialExceedsMax {
                initial: self.initial_buffer_size,
                max: self.max_buffer_size,
            });
        }
        if self.shrink_interval == 0 {
            return Err(ConfigError::ZeroShrinkInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ParserConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.initial_buffer_size, DEFAULT_INITIAL_BUFFER_SIZE);
        assert_eq!(config.max_buffer_size, DEFAULT_MAX_BUFFER_SIZE);
        assert_eq!(config.shrink_interval, DEFAULT_SHRINK_INTERVAL);
        assert!(!config.hardened_copy);
    }

    #[test]
    fn test_zero_buffer_size_rejected() {
        let config = ParserConfig {
            initial_buffer_size: 0,
            ..ParserConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroBufferSize));
    }

    #[test]
    fn test_initial_exceeding_max_rejected() {
        let config = ParserConfig {
            initial_buffer_size: 8192,
            max_buffer_size: 4096,
            ..ParserConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InitialExceedsMax {
                initial: 8192,
                max: 4096
            })
        );
    }

    #[test]
    fn test_zero_shrink_interval_rejected() {
        let config = ParserConfig {
            shrink_interval: 0,
            ..ParserConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroShrinkInterval));
    }

    #[test]
    fn test_serde_round_trip() {
        let config = ParserConfig {
            initial_buffer_size: 1024,
            max_buffer_size: 65536,
            shrink_interval: 500,
            hardened_copy: true,
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ParserConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.initial_buffer_size, 1024);
        assert_eq!(parsed.max_buffer_size, 65536);
        assert_eq!(parsed.shrink_interval, 500);
        assert!(parsed.hardened_copy);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: ParserConfig = serde_json::from_str(r#"{"max_buffer_size": 8192}"#).unwrap();
        assert_eq!(parsed.max_buffer_size, 8192);
        assert_eq!(parsed.initial_buffer_size, DEFAULT_INITIAL_BUFFER_SIZE);
        assert_eq!(parsed.shrink_interval, DEFAULT_SHRINK_INTERVAL);
    }
}
