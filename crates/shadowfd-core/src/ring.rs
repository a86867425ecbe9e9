//! Allocation-free diagnostics ring.
//!
//! Hosts embedding this layer as a symbol interposer cannot log through
//! anything that allocates or locks (the call may be interposed malloc
//! itself). `RingLog` is the fallback sink for that context: a fixed byte
//! ring written with relaxed atomic stores, safe to append to from any
//! thread at any point of process life. Concurrent writers may interleave
//! messages; individual bytes are never torn.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

pub struct RingLog {
    bytes: [AtomicU8; Self::CAPACITY],
    head: AtomicUsize,
}

impl Default for RingLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RingLog {
    pub const CAPACITY: usize = 16 * 1024;

    pub const fn new() -> Self {
        Self {
            bytes: [const { AtomicU8::new(0) }; Self::CAPACITY],
            head: AtomicUsize::new(0),
        }
    }

    /// Append `msg`, overwriting the oldest bytes once the ring is full.
    /// Messages longer than the whole ring are dropped.
    pub fn log(&self, msg: &str) {
        let len = msg.len();
        if len > Self::CAPACITY {
            return;
        }
        let start = self.head.fetch_add(len, Ordering::SeqCst);
        for (i, &byte) in msg.as_bytes().iter().enumerate() {
            self.bytes[(start + i) % Self::CAPACITY].store(byte, Ordering::Relaxed);
        }
    }

    /// Copy the most recent bytes into `out`, oldest first. Returns the
    /// number of bytes written (bounded by `out`, the ring capacity, and
    /// what has been logged so far).
    pub fn tail(&self, out: &mut [u8]) -> usize {
        let head = self.head.load(Ordering::SeqCst);
        let avail = head.min(Self::CAPACITY).min(out.len());
        let start = head - avail;
        for (i, slot) in out[..avail].iter_mut().enumerate() {
            *slot = self.bytes[(start + i) % Self::CAPACITY].load(Ordering::Relaxed);
        }
        avail
    }
}
