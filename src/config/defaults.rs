//! Default constants for cachegate configuration
//!
//! These constants define the default values used by [`ParserConfig`]
//! when no explicit value is provided.
//!
//! [`ParserConfig`]: super::ParserConfig

/// Default initial read buffer size per connection, in bytes
pub const DEFAULT_INITIAL_BUFFER_SIZE: usize = 256;

/// Default maximum read buffer size per connection, in bytes.
///
/// The buffer may grow past this transiently to fit an oversized message;
/// the shrink pass brings capacity back down once the connection is idle.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 4096;

/// Number of parsed messages between buffer-shrink considerations.
///
/// Shrinking on every message would thrash allocations after a burst of
/// oversized messages; this interval bounds worst-case per-connection
/// memory without that cost.
pub const DEFAULT_SHRINK_INTERVAL: u64 = 10_000;

/// Whether fully-framed messages are re-homed into a hardened arena
/// before being handed to the decoder
pub const DEFAULT_HARDENED_COPY: bool = false;
