//! Binary frame headers for the framed and compact protocols
//!
//! Both binary protocols are self-describing: a successful header decode
//! yields the header and body byte lengths, which is all the connection
//! parser needs to delimit one message. Payload semantics stay with the
//! codec.
//!
//! ## Framed wire format
//!
//! ```text
//! +-------+---------+--------------+------------+----------+-----------+
//! | magic | version | header_size  | body_size  | type_id  | extension |
//! | 0x7d  |  0x01   |   u16 BE     |  u32 BE    |  u32 BE  | 0+ bytes  |
//! +-------+---------+--------------+------------+----------+-----------+
//! ```
//!
//! `header_size` counts the full header including the 12-byte prelude;
//! values above 12 reserve room for future header fields, which this
//! version skips without interpreting.
//!
//! ## Compact wire format
//!
//! ```text
//! +-------+-----------+---------+----------+
//! | magic | body_size | type_id | trace_id |
//! | 0x5e  |  varint   | varint  |  varint  |
//! +-------+-----------+---------+----------+
//! ```
//!
//! Varints are LEB128 (7 data bits per byte, high bit continues). A varint
//! cut short by the end of the buffer is a partial read, not an error; a
//! varint longer than 10 bytes is malformed.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ParseError;

/// Magic first byte of a framed-protocol message
pub const FRAMED_MAGIC: u8 = 0x7d;

/// Magic first byte of a compact-protocol message
pub const COMPACT_MAGIC: u8 = 0x5e;

/// Wire version of the framed protocol understood by this parser
pub const FRAMED_VERSION: u8 = 1;

/// Byte length of the fixed framed-protocol prelude
pub const FRAMED_PRELUDE_LEN: usize = 12;

/// Upper bound on any header size, shared by both binary protocols
pub const MAX_HEADER_SIZE: u32 = 16 * 1024;

/// Longest accepted varint encoding, in bytes
const MAX_VARINT_LEN: usize = 10;

/// Header fields decoded from a binary frame header.
///
/// A message is extractable once `header_size + body_size` bytes are
/// buffered. `type_id` and `trace_id` are opaque to the framing core and
/// passed through to the codec; the framed protocol leaves `trace_id`
/// zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// Total header length in bytes, magic included
    pub header_size: u32,
    /// Body length in bytes, which may be zero
    pub body_size: u32,
    /// Message type tag, interpreted by the codec
    pub type_id: u32,
    /// Trace correlation id (compact protocol only)
    pub trace_id: u64,
}

impl FrameInfo {
    /// Total message size: header plus body.
    pub fn total_size(&self) -> usize {
        self.header_size as usize + self.body_size as usize
    }
}

/// Outcome of a header decode attempt on buffered bytes.
///
/// `Partial` is the normal "need more data" outcome of stream parsing
/// and is deliberately not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStatus {
    /// The header was fully decoded
    Complete(FrameInfo),
    /// More bytes are needed before the header can be decoded
    Partial,
}

/// Decode a framed-protocol header from the front of `buf`.
pub fn parse_framed_header(buf: &[u8]) -> Result<HeaderStatus, ParseError> {
    let Some(&magic) = buf.first() else {
        return Ok(HeaderStatus::Partial);
    };
    if magic != FRAMED_MAGIC {
        return Err(ParseError::BadMagic {
            protocol: "framed",
            actual: magic,
        });
    }
    if buf.len() < FRAMED_PRELUDE_LEN {
        return Ok(HeaderStatus::Partial);
    }

    let version = buf[1];
    if version != FRAMED_VERSION {
        return Err(ParseError::MalformedHeader {
            protocol: "framed",
            reason: format!("unsupported version {version}"),
        });
    }

    let header_size = u32::from(u16::from_be_bytes([buf[2], buf[3]]));
    if header_size < FRAMED_PRELUDE_LEN as u32 {
        return Err(ParseError::MalformedHeader {
            protocol: "framed",
            reason: format!("header size {header_size} smaller than prelude"),
        });
    }
    if header_size > MAX_HEADER_SIZE {
        return Err(ParseError::HeaderTooLarge {
            protocol: "framed",
            size: header_size,
            max: MAX_HEADER_SIZE,
        });
    }

    let body_size = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let type_id = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

    Ok(HeaderStatus::Complete(FrameInfo {
        header_size,
        body_size,
        type_id,
        trace_id: 0,
    }))
}

/// Decode a compact-protocol header from the front of `buf`.
pub fn parse_compact_header(buf: &[u8]) -> Result<HeaderStatus, ParseError> {
    let Some(&magic) = buf.first() else {
        return Ok(HeaderStatus::Partial);
    };
    if magic != COMPACT_MAGIC {
        return Err(ParseError::BadMagic {
            protocol: "compact",
            actual: magic,
        });
    }

    let mut pos = 1;
    let Some((body_size, used)) = read_varint(&buf[pos..])? else {
        return Ok(HeaderStatus::Partial);
    };
    pos += used;
    if body_size > u64::from(u32::MAX) {
        return Err(ParseError::MalformedHeader {
            protocol: "compact",
            reason: format!("body size {body_size} out of range"),
        });
    }

    let Some((type_id, used)) = read_varint(&buf[pos..])? else {
        return Ok(HeaderStatus::Partial);
    };
    pos += used;
    if type_id > u64::from(u32::MAX) {
        return Err(ParseError::MalformedHeader {
            protocol: "compact",
            reason: format!("type id {type_id} out of range"),
        });
    }

    let Some((trace_id, used)) = read_varint(&buf[pos..])? else {
        return Ok(HeaderStatus::Partial);
    };
    pos += used;

    Ok(HeaderStatus::Complete(FrameInfo {
        header_size: pos as u32,
        body_size: body_size as u32,
        type_id: type_id as u32,
        trace_id,
    }))
}

/// Encode a complete framed-protocol message.
///
/// `header_extension` lands between the prelude and the body and is
/// skipped by current parsers; it exists for forward compatibility.
pub fn encode_framed(type_id: u32, header_extension: &[u8], body: &[u8]) -> Bytes {
    let header_size = FRAMED_PRELUDE_LEN + header_extension.len();
    debug_assert!(header_size <= MAX_HEADER_SIZE as usize);
    let mut out = BytesMut::with_capacity(header_size + body.len());
    out.put_u8(FRAMED_MAGIC);
    out.put_u8(FRAMED_VERSION);
    out.put_u16(header_size as u16);
    out.put_u32(body.len() as u32);
    out.put_u32(type_id);
    out.put_slice(header_extension);
    out.put_slice(body);
    out.freeze()
}

/// Encode a complete compact-protocol message.
pub fn encode_compact(type_id: u32, trace_id: u64, body: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(1 + 3 * MAX_VARINT_LEN + body.len());
    out.put_u8(COMPACT_MAGIC);
    write_varint(&mut out, body.len() as u64);
    write_varint(&mut out, u64::from(type_id));
    write_varint(&mut out, trace_id);
    out.put_slice(body);
    out.freeze()
}

/// Read one LEB128 varint from the front of `buf`.
///
/// Returns `Ok(None)` when the varint runs past the end of the buffer.
fn read_varint(buf: &[u8]) -> Result<Option<(u64, usize)>, ParseError> {
    let mut value: u64 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            break;
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if buf.len() >= MAX_VARINT_LEN {
        return Err(ParseError::MalformedHeader {
            protocol: "compact",
            reason: format!("varint longer than {MAX_VARINT_LEN} bytes"),
        });
    }
    Ok(None)
}

fn write_varint(out: &mut BytesMut, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.put_u8(byte);
            return;
        }
        out.put_u8(byte | 0x80);
    }
}
