//! Chunker — splits one message into wire-ready chunk buffers.
//!
//! A Chunker is created per message and consumed once. Chunks come out in
//! strictly increasing serial order; only the last one carries the
//! end-of-message flag. The message id is caller-chosen — reuse an id only
//! after the previous message under it has been fully transmitted, or the
//! receiver will mix the fragments.

use bytes::{Bytes, BytesMut};
use zerocopy::AsBytes;

use crate::wire::{ChunkError, ChunkHeader, HEADER_LEN};

/// Lazily yields the chunks of a single message.
///
/// `chunk_size` is the payload size per chunk, *excluding* the 9-byte
/// header; the buffers produced are at most `chunk_size + 9` bytes long.
/// Exactly `ceil(message_len / chunk_size)` chunks are produced.
#[derive(Debug)]
pub struct Chunker {
    id: u32,
    message: Bytes,
    chunk_size: usize,
    serial: u32,
    offset: usize,
}

impl Chunker {
    pub fn new(id: u32, message: impl Into<Bytes>, chunk_size: usize) -> Result<Self, ChunkError> {
        let message = message.into();
        if chunk_size < 1 {
            return Err(ChunkError::InvalidArgument("chunk size must be at least 1"));
        }
        if message.is_empty() {
            return Err(ChunkError::InvalidArgument("message may not be empty"));
        }
        Ok(Self {
            id,
            message,
            chunk_size,
            serial: 0,
            offset: 0,
        })
    }

    /// Whether any unread message bytes remain.
    pub fn has_next(&self) -> bool {
        self.offset < self.message.len()
    }
}

impl Iterator for Chunker {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if !self.has_next() {
            return None;
        }
        let remaining = self.message.len() - self.offset;
        let take = remaining.min(self.chunk_size);

        let header = ChunkHeader::new(take == remaining, self.id, self.serial);
        self.serial = self.serial.wrapping_add(1);

        let mut buf = BytesMut::with_capacity(HEADER_LEN + take);
        buf.extend_from_slice(header.as_bytes());
        buf.extend_from_slice(&self.message[self.offset..self.offset + take]);
        self.offset += take;
        Some(buf.freeze())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.message.len() - self.offset;
        let chunks = remaining.div_ceil(self.chunk_size);
        (chunks, Some(chunks))
    }
}

impl ExactSizeIterator for Chunker {}
