//! The fragment types flowing into and out of the engine.

use crate::checksum::ChecksumState;
use crate::key::ReassemblyKey;

/// A parsed IPv4 fragment as handed to the engine by the IP input path.
///
/// The caller is responsible for parsing the IPv4 header and handing over only
/// the bytes that follow it; `ingest` rejects anything that isn't actually a
/// fragment (`more_fragments == false && fragment_offset == 0`).
#[derive(Debug, Clone)]
pub struct RawFragment {
    pub key: ReassemblyKey,
    /// `ihl * 4`, in bytes. Needed to reconstruct `total_len` for the reassembled
    /// datagram once it is complete.
    pub header_len: usize,
    /// More-fragments flag from the IP header.
    pub more_fragments: bool,
    /// 13-bit fragment offset field, in units of 8 bytes, as it appears on the wire.
    pub fragment_offset_units: u16,
    /// Payload bytes following the IP header.
    pub payload: Vec<u8>,
    pub checksum_state: ChecksumState,
    pub device_id: u32,
    pub timestamp: u64,
    /// Bytes to charge to the [`crate::memory::MemoryAccountant`] while this
    /// fragment is held; supplied by the host's buffer allocator.
    pub accounted_size: usize,
}

impl RawFragment {
    pub fn is_fragment(&self) -> bool {
        self.more_fragments || self.fragment_offset_units != 0
    }
}

/// A fragment as tracked inside a [`crate::queue::Queue`], with its byte range
/// normalized to absolute payload offsets.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub payload_offset: usize,
    pub payload_end: usize,
    pub payload: Vec<u8>,
    pub checksum_state: ChecksumState,
    pub accounted_size: usize,
    pub device_id: u32,
    pub timestamp: u64,
}

impl Fragment {
    pub fn len(&self) -> usize {
        self.payload_end - self.payload_offset
    }

    pub fn is_empty(&self) -> bool {
        self.payload_offset == self.payload_end
    }

    /// Removes `n` bytes from the front of the fragment, advancing its offset
    /// and degrading its checksum (trimming always invalidates a cached checksum).
    pub fn trim_front(&mut self, n: usize) {
        debug_assert!(n <= self.len());
        self.payload.drain(0..n);
        self.payload_offset += n;
        self.checksum_state.degrade();
    }

    /// Truncates the fragment so it ends at `new_end`, degrading its checksum.
    pub fn truncate_end(&mut self, new_end: usize) {
        debug_assert!(new_end <= self.payload_end && new_end >= self.payload_offset);
        let keep = new_end - self.payload_offset;
        self.payload.truncate(keep);
        self.payload_end = new_end;
        self.checksum_state.degrade();
    }
}

/// A fully reassembled IPv4 datagram.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub key: ReassemblyKey,
    pub header_len: usize,
    pub payload: Vec<u8>,
    pub checksum_state: ChecksumState,
    pub device_id: u32,
    pub timestamp: u64,
}

impl Datagram {
    /// `tot_len` for the reassembled IPv4 header: header plus payload bytes.
    pub fn total_len(&self) -> usize {
        self.header_len + self.payload.len()
    }
}
