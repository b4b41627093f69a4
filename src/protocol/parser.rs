//! Per-connection parsing state machine
//!
//! [`ConnectionParser`] turns the raw byte stream of one connection into
//! discrete protocol messages. The I/O layer asks for write space with
//! [`writable_chunk`](ConnectionParser::writable_chunk), fills some prefix
//! of it, and reports the length through
//! [`data_available`](ConnectionParser::data_available); the parser
//! classifies the protocol on the very first byte and from then on emits
//! ready-to-decode message slices to its [`ParserSink`].
//!
//! The parser is owned exclusively by one connection's flow and uses no
//! internal locking. Messages are delivered in arrival order; multiple
//! fully-buffered messages in one read event are processed eagerly
//! (pipelining). Parsing never suspends.
//!
//! ## Error model
//!
//! Fatal framing errors are reported once through
//! [`ParserSink::on_parse_error`] and latch the parser: every later
//! `data_available` call returns `false` without touching the sink. "Not
//! enough data yet" is a normal outcome, signalled by a `true` return with
//! no message delivered.

use std::sync::Arc;

use tracing::{debug, error};

use super::buffer::{FrameArena, HeapArena, ReadBuffer};
use super::frame::{self, FrameInfo, HeaderStatus};
use super::Protocol;
use crate::config::ParserConfig;
use crate::error::ParseError;

/// Decode-side collaborator of the connection parser.
///
/// The sink owns payload semantics; the parser only guarantees that the
/// slices it hands over are exact, fully-framed messages.
pub trait ParserSink {
    /// One fully-framed binary message is ready to decode.
    ///
    /// `frame` holds exactly `info.total_size()` bytes, header included.
    /// Returning `false` rejects the message and aborts parsing for the
    /// connection.
    fn on_framed_message(&mut self, info: &FrameInfo, frame: &[u8]) -> bool;

    /// Newly read ascii data is available.
    ///
    /// Framing for the text protocol is fully delegated: the sink must
    /// consume (or leave buffered) the region itself via the buffer's
    /// cursor methods.
    fn on_ascii_data(&mut self, buffer: &mut ReadBuffer);

    /// A fatal framing error occurred; the connection should be closed.
    fn on_parse_error(&mut self, error: &ParseError);
}

/// Incremental multi-protocol message parser for one connection.
pub struct ConnectionParser<S: ParserSink> {
    sink: S,
    buffer: ReadBuffer,
    /// Pinned by the first byte of the stream, never revisited
    protocol: Option<Protocol>,
    /// Messages parsed since the last buffer shrink
    parsed_messages: u64,
    shrink_interval: u64,
    /// Hardened-copy arena; `None` disables the re-homing path
    arena: Option<Arc<dyn FrameArena>>,
    /// Latched after any fatal error
    failed: bool,
}

impl<S: ParserSink> ConnectionParser<S> {
    /// Create a parser for a fresh connection.
    ///
    /// With `hardened_copy` enabled in `config`, messages are re-homed
    /// through a [`HeapArena`]; use [`with_arena`](Self::with_arena) to
    /// supply a custom arena.
    pub fn new(sink: S, config: &ParserConfig) -> Self {
        let arena: Option<Arc<dyn FrameArena>> = if config.hardened_copy {
            Some(Arc::new(HeapArena))
        } else {
            None
        };
        Self::build(sink, config, arena)
    }

    /// Create a parser that re-homes messages through `arena`.
    pub fn with_arena(sink: S, config: &ParserConfig, arena: Arc<dyn FrameArena>) -> Self {
        Self::build(sink, config, Some(arena))
    }

    fn build(sink: S, config: &ParserConfig, arena: Option<Arc<dyn FrameArena>>) -> Self {
        Self {
            sink,
            buffer: ReadBuffer::new(config.initial_buffer_size, config.max_buffer_size),
            protocol: None,
            parsed_messages: 0,
            shrink_interval: config.shrink_interval,
            arena,
            failed: false,
        }
    }

    /// Protocol family of this connection, once classified.
    pub fn protocol(&self) -> Option<Protocol> {
        self.protocol
    }

    /// Whether replies on this connection may be delivered out of order.
    pub fn out_of_order(&self) -> bool {
        self.protocol.map(|p| p.out_of_order()).unwrap_or(false)
    }

    /// Messages parsed since the last buffer shrink.
    pub fn parsed_messages(&self) -> u64 {
        self.parsed_messages
    }

    /// Borrow the sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Borrow the sink mutably.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Discard all buffered bytes. The protocol classification survives.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Return a region safe to read newly received bytes into.
    ///
    /// The caller may fill any prefix of it and must then call
    /// [`data_available`](Self::data_available) with the filled length.
    pub fn writable_chunk(&mut self) -> &mut [u8] {
        self.buffer.writable_chunk()
    }

    /// Feed `n` newly written bytes into the parser.
    ///
    /// Returns `false` on any fatal parse error; the connection should
    /// then be closed. `n == 0` is a normal no-op.
    pub fn data_available(&mut self, n: usize) -> bool {
        if self.failed {
            return false;
        }
        self.buffer.commit(n);
        if self.buffer.is_empty() {
            return true;
        }

        let protocol = match self.protocol {
            Some(protocol) => protocol,
            None => {
                let first = self.buffer.buffered()[0];
                match Protocol::detect(first) {
                    Some(protocol) => {
                        debug!(%protocol, "classified connection protocol");
                        self.protocol = Some(protocol);
                        protocol
                    }
                    None => {
                        self.fail(ParseError::UnknownProtocol(first));
                        return false;
                    }
                }
            }
        };

        match protocol {
            Protocol::Ascii => {
                self.sink.on_ascii_data(&mut self.buffer);
                true
            }
            Protocol::Framed | Protocol::Compact => {
                let ok = self.read_binary_frames(protocol);
                self.maybe_shrink();
                ok
            }
        }
    }

    /// Extract every fully-buffered message, in arrival order.
    fn read_binary_frames(&mut self, protocol: Protocol) -> bool {
        while !self.buffer.is_empty() {
            let status = match protocol {
                Protocol::Framed => frame::parse_framed_header(self.buffer.buffered()),
                Protocol::Compact => frame::parse_compact_header(self.buffer.buffered()),
                // Ascii never enters the frame loop.
                Protocol::Ascii => return true,
            };
            let info = match status {
                Ok(HeaderStatus::Complete(info)) => info,
                Ok(HeaderStatus::Partial) => return true,
                Err(err) => {
                    self.fail(err);
                    return false;
                }
            };
            let total = info.total_size();

            // Entire message (and possibly part of the next) is buffered.
            if self.buffer.len() >= total {
                let frame_bytes = &self.buffer.buffered()[..total];
                if !self.sink.on_framed_message(&info, frame_bytes) {
                    self.buffer.clear();
                    self.failed = true;
                    return false;
                }
                self.buffer.consume(total);
                self.parsed_messages += 1;
                continue;
            }

            // Full header not buffered yet: wait for more data.
            if self.buffer.len() < info.header_size as usize {
                return true;
            }

            // Full header, partial body: size the buffer for the whole
            // message in one step, then wait for the remainder.
            self.buffer.reserve_exact_message(total);
            if let Some(arena) = self.arena.clone() {
                self.buffer.rehome(arena.as_ref(), total);
            }
            return true;
        }
        true
    }

    fn maybe_shrink(&mut self) {
        if self.parsed_messages >= self.shrink_interval
            && self.buffer.over_max()
            && self.buffer.is_empty()
        {
            debug!(capacity = self.buffer.capacity(), "shrinking idle read buffer");
            self.parsed_messages = 0;
            self.buffer.shrink_to_target();
        }
    }

    fn fail(&mut self, err: ParseError) {
        error!(error = %err, "fatal parse error, terminating connection parsing");
        self.failed = true;
        self.sink.on_parse_error(&err);
    }
}
