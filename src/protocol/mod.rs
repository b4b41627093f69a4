//! Wire protocol framing for cachegate
//!
//! Three protocol families coexist on the proxy's client port and are
//! told apart by the first byte a connection sends:
//!
//! - **Ascii**: line-based text commands. The core does no framing for
//!   ascii; the unconsumed buffer region is delegated to the codec.
//! - **Framed**: binary, fixed 12-byte prelude with an extensible header.
//! - **Compact**: binary, varint-encoded header for small frames.
//!
//! ## Submodules
//!
//! - `buffer`: per-connection read buffer with compaction, exact-fit
//!   growth and shrink hysteresis
//! - `frame`: binary header encoding/decoding
//! - `parser`: the per-connection parsing state machine

pub mod buffer;
pub mod frame;
pub mod parser;

pub use buffer::{FrameArena, HeapArena, ReadBuffer};
pub use frame::{FrameInfo, HeaderStatus, COMPACT_MAGIC, FRAMED_MAGIC};
pub use parser::{ConnectionParser, ParserSink};

use std::fmt;

/// Protocol family of one connection.
///
/// Classified from the first byte of the stream and fixed for the
/// connection's lifetime; a connection cannot change protocol mid-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Line-based text protocol; framing is delegated to the codec
    Ascii,
    /// Binary protocol with a fixed-prelude, extensible header
    Framed,
    /// Binary protocol with a compact varint header
    Compact,
}

impl Protocol {
    /// Classify a connection from the first byte of its stream.
    ///
    /// Returns `None` for an unrecognized byte, which is a hard
    /// connection-level error. Ascii commands always start with an
    /// alphanumeric verb, so those bytes classify as [`Protocol::Ascii`].
    pub fn detect(first_byte: u8) -> Option<Protocol> {
        match first_byte {
            FRAMED_MAGIC => Some(Protocol::Framed),
            COMPACT_MAGIC => Some(Protocol::Compact),
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' => Some(Protocol::Ascii),
            _ => None,
        }
    }

    /// Whether replies on this protocol may be delivered out of order.
    ///
    /// The binary protocols carry enough header state to match replies to
    /// requests; ascii replies must stay in request order.
    pub fn out_of_order(&self) -> bool {
        !matches!(self, Protocol::Ascii)
    }

    /// Short protocol name for error messages and log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Ascii => "ascii",
            Protocol::Framed => "framed",
            Protocol::Compact => "compact",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
