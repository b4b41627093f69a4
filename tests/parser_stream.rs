//! End-to-end framing scenarios for the connection parser.
//!
//! These tests drive a parser the way the I/O layer would: ask for write
//! space, copy in a chunk of the simulated socket stream, report the
//! length, repeat. They cover:
//!
//! - Mixed-protocol streams are impossible: the first byte pins the mode
//! - Mid-header splits followed by exactly-once delivery
//! - Bodies larger than the configured maximum buffer size
//! - Interleaved protocols across separate connections
//! - Fatal errors terminating one connection without global state

use cachegate::config::ParserConfig;
use cachegate::error::ParseError;
use cachegate::protocol::frame::{encode_compact, encode_framed};
use cachegate::protocol::{ConnectionParser, FrameInfo, ParserSink, Protocol, ReadBuffer};

#[derive(Default)]
struct Decoder {
    frames: Vec<(FrameInfo, Vec<u8>)>,
    ascii: Vec<u8>,
    errors: Vec<String>,
}

impl ParserSink for Decoder {
    fn on_framed_message(&mut self, info: &FrameInfo, frame: &[u8]) -> bool {
        self.frames.push((*info, frame.to_vec()));
        true
    }

    fn on_ascii_data(&mut self, buffer: &mut ReadBuffer) {
        self.ascii.extend_from_slice(buffer.buffered());
        let n = buffer.len();
        buffer.consume(n);
    }

    fn on_parse_error(&mut self, error: &ParseError) {
        self.errors.push(error.to_string());
    }
}

/// Copy `data` into the parser through its own write-space API.
fn feed(parser: &mut ConnectionParser<Decoder>, mut data: &[u8]) -> bool {
    while !data.is_empty() {
        let chunk = parser.writable_chunk();
        let n = chunk.len().min(data.len());
        chunk[..n].copy_from_slice(&data[..n]);
        if !parser.data_available(n) {
            return false;
        }
        data = &data[n..];
    }
    true
}

fn parser() -> ConnectionParser<Decoder> {
    let config = ParserConfig {
        initial_buffer_size: 64,
        max_buffer_size: 512,
        ..ParserConfig::default()
    };
    ConnectionParser::new(Decoder::default(), &config)
}

#[test]
fn framed_message_split_mid_header_delivers_exactly_once() {
    // [1-byte classifier already inside the header][header_size=20,
    // body_size=5][8 header extension bytes][5 body bytes], split inside
    // the header extension.
    let mut parser = parser();
    let msg = encode_framed(1, &[0xab; 8], b"hello");
    assert_eq!(msg.len(), 25);

    assert!(feed(&mut parser, &msg[..15]));
    assert!(parser.sink().frames.is_empty(), "need more data after chunk 1");

    assert!(feed(&mut parser, &msg[15..]));
    assert_eq!(parser.sink().frames.len(), 1);
    assert_eq!(parser.sink().frames[0].0.header_size, 20);
    assert_eq!(parser.sink().frames[0].0.body_size, 5);
    assert_eq!(parser.sink().frames[0].1, msg.to_vec());
}

#[test]
fn body_larger_than_max_buffer_grows_to_exact_fit() {
    // Header claims a body beyond max_buffer_size: the parser grows the
    // buffer to exactly fit, then completes normally once the body
    // arrives.
    let mut parser = parser();
    let body = vec![0x5au8; 2000];
    let msg = encode_compact(4, 99, &body);

    let header_len = msg.len() - body.len();
    assert!(feed(&mut parser, &msg[..header_len + 1]));
    assert!(parser.sink().frames.is_empty());

    assert!(feed(&mut parser, &msg[header_len + 1..]));
    assert_eq!(parser.sink().frames.len(), 1);
    let (info, frame) = &parser.sink().frames[0];
    assert_eq!(info.body_size, 2000);
    assert_eq!(info.trace_id, 99);
    assert_eq!(frame, &msg.to_vec());
}

#[test]
fn protocol_is_pinned_by_first_byte() {
    // A compact connection later receiving framed-looking bytes treats
    // them as compact data, not as a protocol switch.
    let mut parser = parser();
    assert!(feed(&mut parser, &encode_compact(1, 0, b"ok")));
    assert_eq!(parser.protocol(), Some(Protocol::Compact));

    // A framed magic byte at a message boundary is now a compact header
    // parse failure, which is fatal for the connection.
    assert!(!feed(&mut parser, &encode_framed(1, &[], b"nope")));
    assert_eq!(parser.sink().errors.len(), 1);
    assert!(parser.sink().errors[0].contains("compact"));
    assert_eq!(parser.protocol(), Some(Protocol::Compact));
}

#[test]
fn independent_connections_do_not_share_state() {
    let mut binary = parser();
    let mut text = parser();

    assert!(feed(&mut binary, &encode_framed(7, &[], b"bin")));
    assert!(feed(&mut text, b"get key\r\n"));

    assert_eq!(binary.protocol(), Some(Protocol::Framed));
    assert_eq!(text.protocol(), Some(Protocol::Ascii));
    assert_eq!(binary.sink().frames.len(), 1);
    assert_eq!(text.sink().ascii, b"get key\r\n");

    // A fatal error on one connection leaves the other parsing.
    let mut broken = parser();
    assert!(!feed(&mut broken, &[0x01]));
    assert!(feed(&mut binary, &encode_framed(8, &[], b"more")));
    assert_eq!(binary.sink().frames.len(), 2);
}

#[test]
fn pipelined_mixed_size_messages_arrive_in_order() {
    let mut parser = parser();
    let mut stream = Vec::new();
    let bodies: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; i as usize * 10]).collect();
    for (i, body) in bodies.iter().enumerate() {
        stream.extend_from_slice(&encode_framed(i as u32, &[], body));
    }

    // Deliberately awkward chunking.
    for chunk in stream.chunks(17) {
        assert!(feed(&mut parser, chunk));
    }

    let frames = &parser.sink().frames;
    assert_eq!(frames.len(), bodies.len());
    for (i, (info, frame)) in frames.iter().enumerate() {
        assert_eq!(info.type_id, i as u32);
        assert_eq!(&frame[info.header_size as usize..], bodies[i].as_slice());
    }
}

#[test]
fn ascii_stream_delegates_framing_across_reads() {
    let mut parser = parser();
    assert!(feed(&mut parser, b"get foo"));
    assert!(feed(&mut parser, b" bar\r\nquit\r\n"));
    assert_eq!(parser.sink().ascii, b"get foo bar\r\nquit\r\n");
    assert!(parser.sink().frames.is_empty());
    assert!(parser.sink().errors.is_empty());
}
