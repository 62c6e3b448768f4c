//! shard-core — message chunking and reassembly for size-limited transports.
//!
//! Splits a logical message into 9-byte-header chunks that fit a channel's
//! maximum payload size, and reassembles chunks arriving out of order and
//! interleaved across concurrent message ids. The host application owns
//! the transport; this crate only frames, orders, and merges bytes.

pub mod chunker;
pub mod unchunker;
pub mod wire;

pub use chunker::Chunker;
pub use unchunker::Unchunker;
pub use wire::{Chunk, ChunkError, HEADER_LEN};
