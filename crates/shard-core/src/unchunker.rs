//! Unchunker — merges interleaved, out-of-order chunks back into messages.
//!
//! One long-lived Unchunker per transport is enough: fragments are grouped
//! by message id, so chunks of concurrent messages may arrive interleaved
//! in any order. Completed messages are handed to the registered listener
//! and also returned from [`Unchunker::add`], for callers that prefer a
//! return value over inline dispatch.
//!
//! The engine never evicts state on its own. Call [`Unchunker::gc`]
//! periodically or abandoned partial messages accumulate without bound.
//!
//! # Reentrancy
//!
//! The listener runs synchronously, on the calling thread, while the
//! engine's internal lock is held. A listener that calls back into `add`
//! or `gc` on the same Unchunker will deadlock. Hand the message off (e.g.
//! through a channel) instead of processing it inline.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::wire::{Chunk, ChunkError};

/// Listener invoked with each fully reassembled message.
pub type MessageListener = Box<dyn FnMut(Bytes) + Send>;

/// Accumulates the fragments of one not-yet-complete message.
///
/// Fragments are keyed by serial; on a serial collision the insert is a
/// no-op and the first payload is retained. `expected_count` is learned
/// from the end-of-message chunk: serials are zero-based and contiguous,
/// so the end chunk's serial + 1 is the total fragment count.
struct PendingMessage {
    end_arrived: bool,
    expected_count: Option<u32>,
    fragments: BTreeMap<u32, Bytes>,
    last_touched: Instant,
}

impl PendingMessage {
    fn new() -> Self {
        Self {
            end_arrived: false,
            expected_count: None,
            fragments: BTreeMap::new(),
            last_touched: Instant::now(),
        }
    }

    fn push(&mut self, chunk: Chunk) {
        // First writer wins: a duplicate serial leaves the original payload
        // in place and the new one is silently discarded.
        self.fragments.entry(chunk.serial).or_insert(chunk.payload);
        if chunk.end_of_message && !self.end_arrived {
            self.end_arrived = true;
            self.expected_count = Some(chunk.serial + 1);
        }
        self.last_touched = Instant::now();
    }

    fn is_complete(&self) -> bool {
        self.end_arrived && Some(self.fragments.len() as u32) == self.expected_count
    }

    /// Concatenate all fragment payloads in ascending serial order.
    ///
    /// The buffer is sized assuming every fragment is as long as the
    /// lowest-serial one — true for anything a [`Chunker`] produced, where
    /// only the terminal fragment may be shorter. A longer fragment means
    /// the input did not come from a well-behaved sender, and the merge is
    /// refused rather than assembling a message of the wrong shape.
    ///
    /// [`Chunker`]: crate::Chunker
    fn merge(self) -> Result<Bytes, ChunkError> {
        let expected = self.expected_count.unwrap_or(0) as usize;
        let assumed = self
            .fragments
            .values()
            .next()
            .map(Bytes::len)
            .unwrap_or(0);

        let mut buf = BytesMut::with_capacity(assumed * expected);
        for payload in self.fragments.values() {
            if payload.len() > assumed {
                return Err(ChunkError::MergeOverflow {
                    assumed,
                    got: payload.len(),
                });
            }
            buf.extend_from_slice(payload);
        }
        Ok(buf.freeze())
    }

    fn older_than(&self, max_age: Duration) -> bool {
        self.last_touched.elapsed() > max_age
    }
}

struct Inner {
    pending: HashMap<u32, PendingMessage>,
    listener: Option<MessageListener>,
}

impl Inner {
    fn notify(&mut self, message: Bytes) {
        if let Some(listener) = self.listener.as_mut() {
            listener(message);
        }
    }
}

/// The reassembly engine.
///
/// `add` and `gc` take `&self` and may be called concurrently from
/// different threads; a single mutex guards all engine state, and every
/// operation is in-memory and short.
pub struct Unchunker {
    inner: Mutex<Inner>,
}

impl Unchunker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: HashMap::new(),
                listener: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock means a listener panicked mid-dispatch; the
        // engine state is unusable either way.
        self.inner.lock().expect("unchunker state lock poisoned")
    }

    /// Register the completion listener, replacing any previous one.
    ///
    /// May be attached at any time, including after fragments have already
    /// arrived: a late listener observes every message completing after
    /// attachment and none completed before it. See the module docs for
    /// the reentrancy constraint.
    pub fn on_message(&self, listener: impl FnMut(Bytes) + Send + 'static) {
        self.lock().listener = Some(Box::new(listener));
    }

    /// Ingest one chunk buffer.
    ///
    /// Returns `Ok(Some(message))` when this chunk completed a message —
    /// the listener, if any, has already been invoked with the same bytes.
    /// Returns `Ok(None)` when the chunk was buffered.
    ///
    /// A completed message is consumed whether or not a listener is
    /// registered; it is not buffered for later delivery.
    ///
    /// # Errors
    ///
    /// [`ChunkError::MalformedChunk`] if `buf` is shorter than the header;
    /// engine state is unchanged and the caller decides whether to drop
    /// the fragment or the transport.
    ///
    /// [`ChunkError::MergeOverflow`] if a completing message contains a
    /// fragment larger than its first one. The partial message is dropped
    /// and the listener is not invoked; other message ids are unaffected.
    pub fn add(&self, buf: Bytes) -> Result<Option<Bytes>, ChunkError> {
        let chunk = Chunk::parse(buf)?;
        let mut inner = self.lock();

        // A message of exactly one chunk is complete by definition and
        // never touches the fragment map. Any partial state buffered under
        // this id is superseded.
        if chunk.end_of_message && chunk.serial == 0 {
            inner.pending.remove(&chunk.id);
            tracing::debug!(id = chunk.id, len = chunk.payload.len(), "single-chunk message");
            inner.notify(chunk.payload.clone());
            return Ok(Some(chunk.payload));
        }

        let id = chunk.id;
        let pending = inner.pending.entry(id).or_insert_with(PendingMessage::new);
        pending.push(chunk);

        if !pending.is_complete() {
            tracing::trace!(id, fragments = pending.fragments.len(), "fragment buffered");
            return Ok(None);
        }

        // Complete: the entry is removed before merging so a merge failure
        // also discards the unrecoverable message.
        let pending = inner
            .pending
            .remove(&id)
            .expect("pending entry vanished while locked");
        let fragments = pending.fragments.len();
        let message = pending.merge()?;
        tracing::debug!(id, fragments, len = message.len(), "message reassembled");
        inner.notify(message.clone());
        Ok(Some(message))
    }

    /// Evict every partial message untouched for longer than `max_age`.
    ///
    /// Returns the number of fragments discarded (not messages). Completed
    /// messages are never affected — their state is gone the moment they
    /// are delivered.
    pub fn gc(&self, max_age: Duration) -> usize {
        let mut discarded = 0;
        self.lock().pending.retain(|&id, pending| {
            let stale = pending.older_than(max_age);
            if stale {
                discarded += pending.fragments.len();
                tracing::debug!(id, fragments = pending.fragments.len(), "evicted stale partial message");
            }
            !stale
        });
        discarded
    }

    /// Number of partially assembled messages currently buffered.
    pub fn pending_messages(&self) -> usize {
        self.lock().pending.len()
    }
}

impl Default for Unchunker {
    fn default() -> Self {
        Self::new()
    }
}
