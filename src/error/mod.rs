//! Error types for cachegate
//!
//! This module defines the error taxonomy used throughout the crate:
//!
//! - [`ParseError`] - fatal framing errors on a connection's byte stream
//! - [`ContextError`] - request-context contract violations
//! - [`ConfigError`] - invalid configuration values
//! - [`CachegateError`] - top-level error unifying the above
//!
//! "Not enough data yet" is deliberately *not* represented here. A partial
//! read is the normal outcome of stream parsing and is reported through
//! [`HeaderStatus::Partial`](crate::protocol::HeaderStatus), never as an
//! error value.

use thiserror::Error;

/// Result type alias for cachegate operations
pub type Result<T> = std::result::Result<T, CachegateError>;

/// Main error type for cachegate
#[derive(Error, Debug)]
pub enum CachegateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("request context error: {0}")]
    Context(#[from] ContextError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Fatal framing errors.
///
/// Every variant is terminal for the connection that produced it: the
/// parser reports the error once through
/// [`ParserSink::on_parse_error`](crate::protocol::ParserSink::on_parse_error)
/// and refuses further input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The first byte of the stream matched no known protocol family.
    #[error("unrecognized first byte 0x{0:02x}")]
    UnknownProtocol(u8),

    /// A frame header did not start with the expected magic byte.
    #[error("bad magic byte 0x{actual:02x} for {protocol} frame")]
    BadMagic { protocol: &'static str, actual: u8 },

    /// A frame header was structurally invalid.
    #[error("malformed {protocol} header: {reason}")]
    MalformedHeader {
        protocol: &'static str,
        reason: String,
    },

    /// A frame header declared a size beyond the protocol limit.
    #[error("{protocol} header size {size} exceeds maximum {max}")]
    HeaderTooLarge {
        protocol: &'static str,
        size: u32,
        max: u32,
    },
}

/// Request-context contract violations.
///
/// These indicate a caller bug, not malformed external input. Accessors
/// return them as typed errors so the violations stay observable (and
/// testable) in release builds instead of degrading to debug-only asserts.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// `send_reply` was called on a context that already replied.
    #[error("reply already sent for this request")]
    AlreadyReplied,

    /// A routing accessor was called before `dispatch` pinned a config.
    #[error("context has not been dispatched yet")]
    NotDispatched,

    /// A normal-mode accessor was called on a recording (dry-run) context.
    #[error("accessor not available on a recording context")]
    RecordingAccess,
}

/// Configuration validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("buffer size must be non-zero")]
    ZeroBufferSize,

    #[error("initial buffer size {initial} exceeds maximum buffer size {max}")]
    InitialExceedsMax { initial: usize, max: usize },

    #[error("shrink interval must be non-zero")]
    ZeroShrinkInterval,
}
