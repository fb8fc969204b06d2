//! Bounded drop-oldest queue between the serial drain loop and the streamer.
//!
//! The device emits bytes in sparse bursts while the streamer drains at its
//! own pace, so the two are decoupled by a bounded buffer. Admission is
//! drop-oldest: when the queue is full, the oldest chunk is evicted to make
//! room for the new one. A client that falls behind loses the stalest data
//! first and never applies backpressure to the device-reading path.
//!
//! Single producer (drain loop), single consumer (streamer). Both sides are
//! non-blocking; the streamer's empty-queue case is handled by its silence
//! synthesis, not by waiting here.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// One read's worth of raw demodulated bytes from the device FIFO.
pub type SampleChunk = Vec<u8>;

/// Bounded drop-oldest chunk buffer.
pub struct ChunkQueue {
    inner: Mutex<VecDeque<SampleChunk>>,
    capacity: usize,
    evicted: AtomicU64,
}

impl ChunkQueue {
    /// Creates a queue holding at most `capacity` chunks.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            evicted: AtomicU64::new(0),
        }
    }

    /// Admits `chunk`, evicting the oldest entry first when full.
    ///
    /// Never blocks and never fails; returns `true` if an eviction happened.
    pub fn push(&self, chunk: SampleChunk) -> bool {
        let mut q = self.inner.lock().unwrap();
        let mut evicted = false;
        if q.len() == self.capacity {
            q.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
            evicted = true;
        }
        q.push_back(chunk);
        evicted
    }

    /// Removes and returns the oldest chunk, or `None` when empty.
    pub fn pop(&self) -> Option<SampleChunk> {
        self.inner.lock().unwrap().pop_front()
    }

    /// Number of chunks currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// True when no chunks are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total chunks evicted since creation (diagnostics only).
    pub fn evicted_count(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Discards all queued chunks. Used between client sessions so a new
    /// client never starts with another session's stale bursts.
    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
