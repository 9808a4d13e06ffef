//! Tracks bytes currently owned by the engine: fragment payloads plus queue
//! descriptors. A single lock-free counter, read as an advisory gauge.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Estimated size in bytes of one queue descriptor's own bookkeeping, charged to
/// the accountant in addition to its fragments' `accounted_size`.
pub const QUEUE_DESCRIPTOR_SIZE: usize = std::mem::size_of::<crate::queue::QueueState>();

/// A monotonic, atomically-updated byte counter with two advisory thresholds.
#[derive(Debug)]
pub struct MemoryAccountant {
    current: AtomicUsize,
    pub high_watermark: usize,
    pub low_watermark: usize,
}

impl MemoryAccountant {
    pub fn new(high_watermark: usize, low_watermark: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            high_watermark,
            low_watermark,
        }
    }

    pub fn add(&self, n: usize) {
        self.current.fetch_add(n, Ordering::Relaxed);
    }

    /// Subtracts `n`, saturating at zero. A caller that races past zero indicates
    /// a double-free bug elsewhere; saturating avoids a panic on the hot path
    /// while still being observable via `current()` staying at zero.
    pub fn sub(&self, n: usize) {
        self.current.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
            Some(cur.saturating_sub(n))
        }).ok();
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    pub fn over_high_watermark(&self) -> bool {
        self.current() > self.high_watermark
    }
}
