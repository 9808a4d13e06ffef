//! The checksum-validity lattice carried by each fragment and the reassembled datagram.

/// Whether a fragment's (or datagram's) upper-layer checksum can still be trusted.
///
/// Trimming a fragment's payload during overlap resolution invalidates any checksum
/// computed over the original bytes, so the state only ever moves downward:
/// `Unnecessary` > `Hardware(_)` > `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumState {
    /// The datagram carries a protocol for which checksum verification is skipped
    /// (e.g. a raw protocol with no upper-layer checksum).
    Unnecessary,
    /// A hardware-computed partial checksum, still foldable into a final value.
    Hardware(u16),
    /// No usable checksum; the consumer must verify in software or not at all.
    #[default]
    None,
}

impl ChecksumState {
    /// Degrades to `None`, the bottom of the lattice. Trimming always calls this.
    pub fn degrade(&mut self) {
        *self = ChecksumState::None;
    }

    /// Combines the checksum states of two fragments being joined into one datagram.
    /// `Unnecessary` only survives if both sides agree; any `Hardware`/`None` mix
    /// degrades to `None`, matching the reference reassembly's conservative rule.
    pub fn combine(self, other: ChecksumState) -> ChecksumState {
        match (self, other) {
            (ChecksumState::Unnecessary, ChecksumState::Unnecessary) => ChecksumState::Unnecessary,
            _ => ChecksumState::None,
        }
    }
}
