#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # cachegate
//!
//! cachegate is the request-framing and request-lifecycle core of a
//! high-throughput memory-cache proxy. It turns the raw byte stream of a
//! connection into discrete, well-formed protocol messages across three
//! coexisting wire formats, and tracks the lifetime, ownership and
//! exactly-once reply semantics of every in-flight request as it fans
//! out through a routing tree.
//!
//! ## Features
//!
//! - **Multi-protocol framing**: ascii, framed (fixed-prelude binary)
//!   and compact (varint binary) protocols coexist on one port, told
//!   apart by the first byte of each connection
//! - **Zero-copy buffering**: one growable/shrinkable read buffer per
//!   connection with compaction, exact-fit growth for oversized
//!   messages and shrink hysteresis
//! - **Pipelining**: every fully-buffered message in a read event is
//!   delivered eagerly, in arrival order
//! - **One-shot replies**: request contexts guarantee exactly-once reply
//!   delivery with typed contract-violation errors
//! - **Dry-run routing**: recording contexts observe routing decisions
//!   without performing I/O, config access or logging
//! - **Hardened copies**: optionally re-home message bytes into an
//!   explicitly supplied arena for tamper/diagnostic isolation
//!
//! ## Library Usage
//!
//! The I/O layer drives a [`ConnectionParser`] per connection:
//!
//! ```no_run
//! use cachegate::config::ParserConfig;
//! use cachegate::protocol::{ConnectionParser, FrameInfo, ParserSink, ReadBuffer};
//! use cachegate::error::ParseError;
//!
//! struct Decoder;
//!
//! impl ParserSink for Decoder {
//!     fn on_framed_message(&mut self, _info: &FrameInfo, _frame: &[u8]) -> bool {
//!         // decode and act on one fully-framed message
//!         true
//!     }
//!     fn on_ascii_data(&mut self, buffer: &mut ReadBuffer) {
//!         // text protocol delimiting is the codec's job
//!         let n = buffer.len();
//!         buffer.consume(n);
//!     }
//!     fn on_parse_error(&mut self, error: &ParseError) {
//!         eprintln!("connection failed: {error}");
//!     }
//! }
//!
//! let mut parser = ConnectionParser::new(Decoder, &ParserConfig::default());
//! loop {
//!     let _chunk = parser.writable_chunk();
//!     let n = 0; // fill some prefix of `_chunk` from the socket
//!     if !parser.data_available(n) {
//!         break; // fatal parse error, close the connection
//!     }
//! }
//! ```
//!
//! Decoded requests travel through a
//! [`TypedRequestContext`](proxy::TypedRequestContext): sole-owned at
//! creation, converted to shared ownership by
//! [`dispatch`](proxy::TypedRequestContext::dispatch) before routing,
//! and completed by exactly one
//! [`send_reply`](proxy::TypedRequestContext::send_reply).

pub mod config;
pub mod error;
pub mod protocol;
pub mod proxy;

pub use error::{CachegateError, Result};
pub use protocol::{ConnectionParser, FrameInfo, ParserSink, Protocol, ReadBuffer};
pub use proxy::{RequestContext, RequestPriority, TypedRequestContext};
