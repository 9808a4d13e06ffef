//! One in-progress datagram: its fragments, metadata, expiry timer, and lock.
//!
//! A queue's lifetime is managed by `Arc` strong-count rather than a hand-rolled
//! refcount field: table presence, timer presence, and each in-flight caller
//! each hold a clone of the `Arc<Queue>`. The queue (and its accounted memory)
//! is released exactly when the last clone drops.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::fragment::Fragment;
use crate::key::ReassemblyKey;
use crate::memory::{MemoryAccountant, QUEUE_DESCRIPTOR_SIZE};

/// Bit-packed status flags, following the same hand-rolled newtype style as a
/// packed protocol header field rather than pulling in a bitflags crate for
/// three bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueFlags(u8);

impl QueueFlags {
    pub const FIRST_IN: u8 = 0b001;
    pub const LAST_IN: u8 = 0b010;
    pub const COMPLETE: u8 = 0b100;

    pub fn set(&mut self, bit: u8) {
        self.0 |= bit;
    }

    pub fn is_set(&self, bit: u8) -> bool {
        self.0 & bit != 0
    }
}

/// The mutable state of one reassembly, guarded by `Queue::lock`.
#[derive(Debug, Default)]
pub struct QueueState {
    /// Sorted ascending by `payload_offset`, pairwise disjoint once `insert`
    /// has resolved overlaps.
    pub fragments: Vec<Fragment>,
    /// Best current estimate of the full datagram payload length. Starts at
    /// zero and may grow as non-terminal fragments arrive; becomes final once
    /// a terminal (MF=0) fragment is admitted without contradiction.
    pub total_length: usize,
    pub received_bytes: usize,
    pub flags: QueueFlags,
    /// Header length of the first (offset 0) fragment seen, needed to build
    /// the reassembled datagram's header length.
    pub header_len: usize,
    pub device_id: u32,
    pub timestamp: u64,
    /// The queue's own expiry timer. `None` once cancelled or fired.
    pub timer: Option<JoinHandle<()>>,
}

impl QueueState {
    pub fn is_complete(&self) -> bool {
        self.flags.is_set(QueueFlags::COMPLETE)
    }

    /// The completeness test from the fragment-list algorithm: both ends seen
    /// and every byte between them accounted for.
    pub fn is_fully_assembled(&self) -> bool {
        self.flags.is_set(QueueFlags::FIRST_IN)
            && self.flags.is_set(QueueFlags::LAST_IN)
            && self.total_length == self.received_bytes
    }
}

/// One in-progress reassembly, identified by `key` and referenced through
/// `Arc<Queue>` from the table, the LRU list, the timer task, and any
/// in-flight caller.
#[derive(Debug)]
pub struct Queue {
    pub key: ReassemblyKey,
    pub state: Mutex<QueueState>,
    accountant: Arc<MemoryAccountant>,
}

impl Queue {
    /// Creates a queue and immediately charges its descriptor size to
    /// `accountant`, mirroring `frag_alloc_queue`'s immediate atomic_add.
    pub fn new(key: ReassemblyKey, accountant: Arc<MemoryAccountant>) -> Self {
        accountant.add(QUEUE_DESCRIPTOR_SIZE);
        Self {
            key,
            state: Mutex::new(QueueState::default()),
            accountant,
        }
    }
}

impl Drop for Queue {
    /// Releases this queue's descriptor and any fragments still attached to
    /// it. This runs exactly when the last `Arc<Queue>` clone (table
    /// presence, timer presence, or an in-flight caller) is dropped — the
    /// direct analog of `ip_frag_destroy` firing when `refcnt` hits zero.
    fn drop(&mut self) {
        let state = self.state.lock().unwrap();
        let fragment_bytes: usize = state.fragments.iter().map(|f| f.accounted_size).sum();
        self.accountant.sub(fragment_bytes + QUEUE_DESCRIPTOR_SIZE);
    }
}
