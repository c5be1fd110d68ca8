// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Fixed-chunk PCM ring buffer shared between the producer and consumer
//! threads (component B).
//!
//! One producer, one consumer, one mutex. Each chunk is exclusively owned
//! by whichever side its `filled` flag currently designates — the lock
//! only protects the index bookkeeping (`l`, `h`, `filled`, `r`, `w`), not
//! the chunk bytes themselves, so copying into/out of a chunk never holds
//! the lock. Ground truth: cmus's `buffer.c`.

use parking_lot::Mutex;

/// Bytes per chunk. Must be a multiple of every supported frame size; 60
/// KiB matches the reference and comfortably divides every frame size up
/// to 48 bytes (32 channels × 32-bit bigger than anything this engine
/// narrows down to, but kept generous for unnarrowed high-channel-count
/// passthrough).
pub const CHUNK_SIZE: usize = 60 * 1024;

/// A sink must be able to accept at least this many contiguous bytes
/// without blocking; the producer finalizes a chunk once its remaining
/// free space drops below this, guaranteeing the consumer always sees a
/// usable amount of contiguous data per chunk.
const MIN_USEFUL_REMAINDER: usize = 1024;

struct Chunk {
    data: Box<[u8; CHUNK_SIZE]>,
    /// First filled byte.
    l: usize,
    /// One past the last filled byte.
    h: usize,
    /// `false`: owned by producer. `true`: owned by consumer.
    filled: bool,
}

impl Chunk {
    fn new() -> Self {
        Self {
            data: Box::new([0u8; CHUNK_SIZE]),
            l: 0,
            h: 0,
            filled: false,
        }
    }

    fn reset(&mut self) {
        self.l = 0;
        self.h = 0;
        self.filled = false;
    }
}

struct Inner {
    chunks: Vec<Chunk>,
    r: usize,
    w: usize,
}

/// A fixed-size circular queue of `CHUNK_SIZE`-byte chunks.
///
/// `N` chunks are allocated up front; `reset()` may only be called when
/// both threads are known to be outside the ring buffer's critical
/// section (producer stopped/paused, consumer not mid-read), matching the
/// reference's `buffer_reset` contract.
pub struct RingBuffer {
    inner: Mutex<Inner>,
    nr_chunks: usize,
}

impl RingBuffer {
    /// Allocate a ring buffer with `nr_chunks` chunks (clamped to at least 1).
    pub fn new(nr_chunks: usize) -> Self {
        let nr_chunks = nr_chunks.max(1);
        let chunks = (0..nr_chunks).map(|_| Chunk::new()).collect();
        Self {
            inner: Mutex::new(Inner { chunks, r: 0, w: 0 }),
            nr_chunks,
        }
    }

    /// Number of chunks this buffer was allocated with.
    pub fn capacity_chunks(&self) -> usize {
        self.nr_chunks
    }

    /// Copy out up to `max_len` bytes of the current read chunk's filled
    /// region into `out`, without consuming them. Returns the number of
    /// bytes copied. Returns `0` if the read chunk is empty (producer
    /// owns it, or it's been fully drained).
    pub fn peek_read(&self, out: &mut [u8]) -> usize {
        let inner = self.inner.lock();
        let c = &inner.chunks[inner.r];
        if !c.filled {
            return 0;
        }
        let avail = c.h - c.l;
        let n = avail.min(out.len());
        out[..n].copy_from_slice(&c.data[c.l..c.l + n]);
        n
    }

    /// Length of the current read chunk's filled region, without copying.
    pub fn read_len(&self) -> usize {
        let inner = self.inner.lock();
        let c = &inner.chunks[inner.r];
        if c.filled {
            c.h - c.l
        } else {
            0
        }
    }

    /// Mark `n` bytes of the current read chunk as consumed. When the
    /// chunk is fully drained (`l == h`), frees it back to the producer
    /// and advances `r`. `n` must not exceed the length last reported by
    /// `read_len`/`peek_read`.
    pub fn consume(&self, n: usize) {
        assert!(n > 0, "consume(0) is a no-op the caller shouldn't make");
        let mut inner = self.inner.lock();
        let r = inner.r;
        let c = &mut inner.chunks[r];
        assert!(c.filled, "consume() on an unfilled chunk");
        c.l += n;
        if c.l == c.h {
            c.reset();
            inner.r = (r + 1) % self.nr_chunks;
        }
    }

    /// Copy `src` into the current write chunk's free region and advance
    /// `h`, finalizing the chunk (flipping `filled`, advancing `w`) when
    /// free space drops below `MIN_USEFUL_REMAINDER` or when `src` is
    /// empty and the chunk already has data (a flush). Returns the number
    /// of bytes actually copied (may be less than `src.len()` if the
    /// caller over-ran the region `write_len` promised — callers should
    /// not do that).
    pub fn fill(&self, src: &[u8]) -> usize {
        let mut inner = self.inner.lock();
        let w = inner.w;
        let c = &mut inner.chunks[w];
        assert!(!c.filled, "fill() on an already-filled chunk");
        let free = CHUNK_SIZE - c.h;
        let n = src.len().min(free);
        c.data[c.h..c.h + n].copy_from_slice(&src[..n]);
        c.h += n;

        if CHUNK_SIZE - c.h < MIN_USEFUL_REMAINDER || (src.is_empty() && c.h > 0) {
            c.filled = true;
            inner.w = (w + 1) % self.nr_chunks;
        }
        n
    }

    /// Free bytes available in the current write chunk, or `0` if it's
    /// already filled (owned by the consumer). Non-zero results are
    /// always `>= MIN_USEFUL_REMAINDER` bytes... except for the
    /// legitimate tail case where a chunk was just finalized and rotation
    /// handed the producer a brand-new, fully-empty chunk (`CHUNK_SIZE`
    /// free, trivially above the minimum).
    pub fn write_len(&self) -> usize {
        let inner = self.inner.lock();
        let c = &inner.chunks[inner.w];
        if c.filled {
            0
        } else {
            CHUNK_SIZE - c.h
        }
    }

    /// Zero every chunk and reset `r`/`w` to 0. Callers must ensure no
    /// concurrent producer/consumer access is in flight.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.r = 0;
        inner.w = 0;
        for c in &mut inner.chunks {
            c.reset();
        }
    }

    /// Number of chunks currently holding filled data, derived from
    /// `(w - r) mod N`, special-cased when `r == w` by inspecting that
    /// chunk's `filled` flag (ground: `buffer_get_filled_chunks`).
    pub fn filled_chunks(&self) -> usize {
        let inner = self.inner.lock();
        let (r, w) = (inner.r, inner.w);
        if r < w {
            w - r
        } else if r > w {
            self.nr_chunks - r + w
        } else if inner.chunks[r].filled {
            self.nr_chunks
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trip() {
        let rb = RingBuffer::new(3);
        let payload = vec![7u8; 2048];
        let n = rb.fill(&payload);
        assert_eq!(n, 2048);
        assert_eq!(rb.read_len(), 2048);
        let mut out = vec![0u8; 2048];
        let got = rb.peek_read(&mut out);
        assert_eq!(got, 2048);
        assert_eq!(out, payload);
        rb.consume(2048);
        assert_eq!(rb.read_len(), 0);
    }

    #[test]
    fn fill_finalizes_chunk_below_minimum_remainder() {
        let rb = RingBuffer::new(2);
        let big = vec![1u8; CHUNK_SIZE - 500];
        rb.fill(&big);
        // 500 bytes remain free, below the 1024 threshold: chunk finalized.
        assert_eq!(rb.filled_chunks(), 1);
        assert_eq!(rb.write_len(), CHUNK_SIZE); // producer rotated to a fresh chunk
    }

    #[test]
    fn zero_count_flush_finalizes_nonempty_chunk() {
        let rb = RingBuffer::new(2);
        rb.fill(&[1, 2, 3]);
        assert_eq!(rb.filled_chunks(), 0); // not finalized yet (plenty of room left)
        rb.fill(&[]); // flush
        assert_eq!(rb.filled_chunks(), 1);
    }

    #[test]
    fn write_region_never_below_minimum_unless_zero() {
        let rb = RingBuffer::new(2);
        let len = rb.write_len();
        assert!(len == 0 || len >= 1024);
    }

    #[test]
    fn filled_chunks_wraps_around() {
        let rb = RingBuffer::new(2);
        // Fill and fully drain chunk 0, then fill chunk 1: r should wrap past w.
        rb.fill(&[0u8; CHUNK_SIZE]); // finalizes chunk 0 (remainder 0 < 1024)
        assert_eq!(rb.filled_chunks(), 1);
        let mut out = vec![0u8; CHUNK_SIZE];
        let n = rb.peek_read(&mut out);
        rb.consume(n);
        assert_eq!(rb.filled_chunks(), 0);
        rb.fill(&[0u8; CHUNK_SIZE]);
        assert_eq!(rb.filled_chunks(), 1);
    }

    #[test]
    fn reset_clears_everything() {
        let rb = RingBuffer::new(2);
        rb.fill(&[9u8; 4096]);
        rb.reset();
        assert_eq!(rb.filled_chunks(), 0);
        assert_eq!(rb.write_len(), CHUNK_SIZE);
    }
}
