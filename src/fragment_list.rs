//! The algorithmic heart of the engine: ordered insertion of one fragment into
//! one queue's fragment list, with precise overlap trimming.
//!
//! `insert` is called with `Queue::state` already locked by the caller; it
//! never touches the queue table or the LRU list, only the queue's own
//! fragment vector, length estimate, flags, and the shared memory accountant.

use crate::error::DropReason;
use crate::fragment::{Fragment, RawFragment};
use crate::memory::MemoryAccountant;
use crate::queue::{QueueFlags, QueueState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Dropped(DropReason),
}

/// Inserts `raw` into `state`, resolving overlaps against existing fragments.
/// Charges/releases `accountant` for any fragment bytes gained or dropped.
pub fn insert(state: &mut QueueState, raw: RawFragment, accountant: &MemoryAccountant) -> InsertOutcome {
    if state.is_complete() {
        // A concurrent evictor/expiry/reassembly already finished this queue;
        // the caller raced find_or_create against it. Treat it the same as a
        // queue that expired out from under this fragment.
        return InsertOutcome::Dropped(DropReason::Expired);
    }

    let offset = raw.fragment_offset_units as usize * 8;
    let end = offset + raw.payload.len();
    let more_fragments = raw.more_fragments;
    let header_len = raw.header_len;

    let mut fragment = Fragment {
        payload_offset: offset,
        payload_end: end,
        payload: raw.payload,
        checksum_state: raw.checksum_state,
        accounted_size: raw.accounted_size,
        device_id: raw.device_id,
        timestamp: raw.timestamp,
    };

    if !more_fragments {
        if end < state.total_length
            || (state.flags.is_set(QueueFlags::LAST_IN) && end != state.total_length)
        {
            return InsertOutcome::Dropped(DropReason::Corrupt);
        }
        state.flags.set(QueueFlags::LAST_IN);
        state.total_length = end;
    } else {
        if fragment.payload_end % 8 != 0 {
            let span = fragment.payload_end - fragment.payload_offset;
            let truncated_end = fragment.payload_offset + (span - span % 8);
            fragment.truncate_end(truncated_end);
        }
        if fragment.payload_end > state.total_length {
            if state.flags.is_set(QueueFlags::LAST_IN) {
                return InsertOutcome::Dropped(DropReason::Corrupt);
            }
            state.total_length = fragment.payload_end;
        }
    }

    if fragment.is_empty() {
        return InsertOutcome::Dropped(DropReason::ZeroLength);
    }

    let mut insert_idx = state.fragments.len();
    for (i, existing) in state.fragments.iter().enumerate() {
        if existing.payload_offset >= fragment.payload_offset {
            insert_idx = i;
            break;
        }
    }

    if insert_idx > 0 {
        let prev = &state.fragments[insert_idx - 1];
        if prev.payload_end > fragment.payload_offset {
            let overlap = prev.payload_end - fragment.payload_offset;
            if fragment.payload_end <= fragment.payload_offset + overlap {
                return InsertOutcome::Dropped(DropReason::ZeroLength);
            }
            fragment.trim_front(overlap);
        }
    }

    while insert_idx < state.fragments.len()
        && state.fragments[insert_idx].payload_offset < fragment.payload_end
    {
        let overlap = fragment.payload_end - state.fragments[insert_idx].payload_offset;
        if overlap < state.fragments[insert_idx].len() {
            state.fragments[insert_idx].trim_front(overlap);
            state.received_bytes -= overlap;
            break;
        } else {
            let removed = state.fragments.remove(insert_idx);
            state.received_bytes -= removed.len();
            accountant.sub(removed.accounted_size);
        }
    }

    let first_in = fragment.payload_offset == 0;

    state.received_bytes += fragment.len();
    accountant.add(fragment.accounted_size);
    state.device_id = fragment.device_id;
    state.timestamp = fragment.timestamp;
    if first_in {
        state.flags.set(QueueFlags::FIRST_IN);
        state.header_len = header_len;
    }

    state.fragments.insert(insert_idx, fragment);

    InsertOutcome::Inserted
}
