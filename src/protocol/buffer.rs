//! Per-connection read buffer
//!
//! One contiguous, resizable byte region per connection. The I/O layer
//! writes newly received bytes into the region returned by
//! [`ReadBuffer::writable_chunk`], the parser consumes stabilized message
//! bytes from the front, and capacity management (cursor reset,
//! compaction, exact-fit growth, shrink hysteresis) happens here so the
//! parser state machine stays free of allocation policy.
//!
//! Buffered-but-unconsumed bytes live in `[read, write)`. Bytes before
//! `read` are reclaimable headroom; bytes at `write` and beyond are free
//! write space. The backing region is always fully initialized, so write
//! space can be handed out as a plain `&mut [u8]`.

use tracing::{debug, warn};

/// Allocation source for the hardened-copy path.
///
/// The arena is passed explicitly per parser instance rather than held in
/// hidden process-wide state, so the hardened behavior is unit-testable.
/// A production implementation can back this with pages excluded from
/// core dumps (for example `madvise(MADV_DONTDUMP)`).
pub trait FrameArena: Send + Sync {
    /// Allocate a zeroed region of exactly `len` bytes.
    ///
    /// Returns `None` when the arena cannot satisfy the request.
    fn allocate(&self, len: usize) -> Option<Vec<u8>>;
}

/// Default arena backed by the global allocator. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapArena;

impl FrameArena for HeapArena {
    fn allocate(&self, len: usize) -> Option<Vec<u8>> {
        Some(vec![0; len])
    }
}

/// Growable, shrinkable read buffer with explicit cursors.
#[derive(Debug)]
pub struct ReadBuffer {
    /// Backing region; length always equals capacity and stays zeroed
    /// past the write cursor
    buf: Vec<u8>,
    /// Start of buffered-but-unconsumed bytes
    read: usize,
    /// End of buffered bytes, start of free write space
    write: usize,
    /// Size the buffer aims for; raised transiently for oversized messages
    target_size: usize,
    /// Configured steady-state capacity bound used by the shrink pass
    max_size: usize,
}

impl ReadBuffer {
    /// Create a buffer with `initial` capacity and a steady-state bound
    /// of `max_size`.
    pub fn new(initial: usize, max_size: usize) -> Self {
        Self {
            buf: vec![0; initial],
            read: 0,
            write: 0,
            target_size: initial,
            max_size,
        }
    }

    /// Number of buffered-but-unconsumed bytes.
    pub fn len(&self) -> usize {
        self.write - self.read
    }

    /// Whether no unconsumed bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// Current capacity of the backing region.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Current target size (grows with oversized messages, clamped back
    /// by the shrink pass).
    pub fn target_size(&self) -> usize {
        self.target_size
    }

    /// The buffered-but-unconsumed region.
    pub fn buffered(&self) -> &[u8] {
        &self.buf[self.read..self.write]
    }

    /// Free space after the write cursor.
    pub fn tailroom(&self) -> usize {
        self.buf.len() - self.write
    }

    /// Return a region safe to write newly received bytes into.
    ///
    /// If the buffer is logically empty the cursors reset to the start
    /// and the whole region is reused. Otherwise headroom before the read
    /// cursor is reclaimed by compacting buffered bytes to the front.
    /// Only when neither frees any space does the region grow, by one
    /// target-size step. The returned slice is never empty and is capped
    /// at `target_size` bytes.
    pub fn writable_chunk(&mut self) -> &mut [u8] {
        if self.is_empty() {
            self.read = 0;
            self.write = 0;
        } else if self.read > 0 {
            self.buf.copy_within(self.read..self.write, 0);
            self.write -= self.read;
            self.read = 0;
        }
        if self.tailroom() == 0 {
            let grown = self.write + self.target_size;
            self.buf.resize(grown, 0);
        }
        let end = self.buf.len().min(self.write + self.target_size);
        &mut self.buf[self.write..end]
    }

    /// Advance the write cursor after the I/O layer filled `n` bytes of
    /// the last [`writable_chunk`](Self::writable_chunk). A zero `n` is a
    /// no-op signalling end-of-data for this read attempt.
    pub fn commit(&mut self, n: usize) {
        debug_assert!(n <= self.tailroom(), "commit past end of write space");
        self.write += n.min(self.tailroom());
    }

    /// Drop `n` consumed bytes from the front of the buffered region.
    pub fn consume(&mut self, n: usize) {
        self.read += n.min(self.len());
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
    }

    /// Grow so a message of `total` bytes fits without further resizing.
    ///
    /// Called once per oversized message, when the header is known but
    /// the body is still in flight; sizing to the known message length
    /// avoids repeated small growths. Raises `target_size` so the
    /// follow-up reads are offered the full remainder in one chunk.
    pub fn reserve_exact_message(&mut self, total: usize) {
        if self.len() + self.tailroom() >= total {
            return;
        }
        self.target_size = self.target_size.max(total);
        if self.read > 0 {
            self.buf.copy_within(self.read..self.write, 0);
            self.write -= self.read;
            self.read = 0;
        }
        let needed = self.write + (total - self.len());
        if self.buf.len() < needed {
            debug!(
                capacity = self.buf.len(),
                needed, "growing read buffer for oversized message"
            );
            self.buf.resize(needed, 0);
        }
    }

    /// Reset the buffer to the steady-state target capacity.
    ///
    /// Must only be called when the buffer is empty; the parser applies
    /// the hysteresis policy (message-count interval, capacity above the
    /// configured maximum) before calling this.
    pub fn shrink_to_target(&mut self) {
        debug_assert!(self.is_empty(), "shrink while data is buffered");
        self.target_size = self.target_size.min(self.max_size);
        self.buf = vec![0; self.target_size];
        self.read = 0;
        self.write = 0;
    }

    /// Whether capacity exceeds the configured steady-state bound.
    pub fn over_max(&self) -> bool {
        self.buf.len() > self.max_size
    }

    /// Re-home the buffered bytes into arena-drawn storage.
    ///
    /// Used by the hardened-copy path once a message's full size is
    /// known: the region is sized to `total` so the remaining body bytes
    /// land in hardened memory too. On arena failure the buffer is left
    /// untouched and parsing degrades to the normal path; the message is
    /// still delivered. Returns whether the re-home happened.
    pub fn rehome(&mut self, arena: &dyn FrameArena, total: usize) -> bool {
        let total = total.max(self.len());
        let Some(mut region) = arena.allocate(total) else {
            warn!(bytes = total, "hardened arena allocation failed, keeping normal buffer");
            return false;
        };
        let len = self.len();
        region[..len].copy_from_slice(self.buffered());
        self.buf = region;
        self.read = 0;
        self.write = len;
        true
    }
}
