//! Error and outcome types. Routine per-fragment outcomes are plain enums;
//! programmer-facing contract violations are a `thiserror` error type.

use thiserror::Error;

use crate::fragment::Datagram;

/// A misuse of the engine's API surface: a bug in the caller, not a property of
/// untrusted network input.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    #[error("low_watermark_bytes ({low}) must be less than high_watermark_bytes ({high})")]
    InvalidWatermarks { low: usize, high: usize },

    #[error("bucket_count must be a nonzero power of two, got {0}")]
    InvalidBucketCount(usize),

    #[error("fragment is not actually fragmented (more_fragments=false and fragment_offset=0)")]
    NotAFragment,
}

/// Why a fragment (or an entire reassembly) was dropped. These are expected,
/// routine outcomes of processing untrusted fragments, not bugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Size inconsistency or a contradictory terminal fragment.
    Corrupt,
    /// The fragment's payload range was empty after normalization.
    ZeroLength,
    /// Reassembled datagram would exceed 65535 bytes.
    Oversize,
    /// Allocation failure while creating or expanding a queue.
    NoMemory,
    /// The queue's expiry timer fired before reassembly completed.
    Expired,
    /// The engine was flushed before reassembly completed.
    EngineShutdown,
}

/// The outcome of one `ingest` call.
#[derive(Debug, Clone)]
pub enum IngestResult {
    /// The fragment completed its datagram; here it is.
    Delivered(Datagram),
    /// The fragment was accepted but its datagram is not yet complete.
    Pending,
    /// The fragment (or its queue) was dropped.
    Dropped(DropReason),
}
