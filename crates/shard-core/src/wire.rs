//! Shard wire format — the on-wire chunk layout.
//!
//! These types ARE the protocol. Every field, every reserved bit is part of
//! the wire format; changing anything here is a breaking change. Read
//! docs/wire-format.md before modifying.
//!
//! A chunk buffer is a 9-byte header followed by the payload:
//!
//! ```text
//! [1-byte flags][4-byte id, BE][4-byte serial, BE][0..N bytes payload]
//! ```
//!
//! All types are #[repr(C, packed)] for deterministic layout and use
//! zerocopy derives for safe, allocation-free serialization. Multi-byte
//! fields are network byte order. There is no unsafe code in this module.

use std::cmp::Ordering;

use bytes::Bytes;
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{NetworkEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

// ── Chunk Header ─────────────────────────────────────────────────────────────

/// Length of the fixed chunk header in bytes.
pub const HEADER_LEN: usize = 9;

/// Flags bit 0 — this chunk carries the final bytes of its message.
pub const FLAG_END_OF_MESSAGE: u8 = 0x01;

/// The fixed header preceding every chunk payload.
///
/// The receiver can group and order a chunk before reading a single byte
/// of payload.
///
/// Wire size: 9 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C, packed)]
pub struct ChunkHeader {
    /// Bit flags:
    ///   bit    0: end-of-message — this is the highest-serial chunk
    ///   bits 1-7: reserved, written as zero, ignored on decode
    pub flags: u8,

    /// Sender-chosen identifier grouping all chunks of one logical message.
    pub id: U32<NetworkEndian>,

    /// Zero-based, contiguous sequence number of this chunk within its
    /// message.
    pub serial: U32<NetworkEndian>,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(ChunkHeader, [u8; 9]);

impl ChunkHeader {
    /// Format a header. Pure; performs no validation beyond the types.
    pub fn new(end_of_message: bool, id: u32, serial: u32) -> Self {
        Self {
            flags: if end_of_message { FLAG_END_OF_MESSAGE } else { 0 },
            id: U32::new(id),
            serial: U32::new(serial),
        }
    }

    pub fn end_of_message(&self) -> bool {
        self.flags & FLAG_END_OF_MESSAGE != 0
    }
}

// ── Chunk ────────────────────────────────────────────────────────────────────

/// One parsed fragment of a larger message.
///
/// Constructed only via [`Chunk::parse`]. The payload is a view into the
/// buffer the chunk was parsed from; no bytes are copied.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub end_of_message: bool,
    pub id: u32,
    pub serial: u32,
    pub payload: Bytes,
}

impl Chunk {
    /// Parse a chunk buffer: 9-byte header, remainder is payload.
    ///
    /// The payload length is not carried on the wire — everything after the
    /// header belongs to this chunk. An empty payload is valid.
    pub fn parse(buf: Bytes) -> Result<Self, ChunkError> {
        let header = ChunkHeader::read_from_prefix(buf.as_ref())
            .ok_or(ChunkError::MalformedChunk { len: buf.len() })?;
        Ok(Self {
            end_of_message: header.end_of_message(),
            id: header.id.get(),
            serial: header.serial.get(),
            payload: buf.slice(HEADER_LEN..),
        })
    }
}

// Reassembly order: id ascending, then serial ascending. Equality is
// (id, serial) only — payload and end flag do not participate, so two
// fragments sharing a serial collapse to one.
impl Ord for Chunk {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id
            .cmp(&other.id)
            .then_with(|| self.serial.cmp(&other.serial))
    }
}

impl PartialOrd for Chunk {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.serial == other.serial
    }
}

impl Eq for Chunk {}

// ── Errors ───────────────────────────────────────────────────────────────────

/// Errors that can arise when chunking or reassembling messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    /// Chunker construction rejected its arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A chunk buffer was shorter than the 9-byte header.
    #[error("malformed chunk: {len} bytes is shorter than the {}-byte header", HEADER_LEN)]
    MalformedChunk { len: usize },

    /// A fragment's payload exceeded the uniform size assumed from the
    /// lowest-serial fragment, so the merge buffer cannot hold the message.
    #[error("merge overflow: fragment payload of {got} bytes exceeds the assumed fragment size of {assumed} bytes")]
    MergeOverflow { assumed: usize, got: usize },
}

// ── Tests ────────────────────────────────────────────────────────────────────
