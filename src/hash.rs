//! Maps a [`ReassemblyKey`] to a bucket index using a periodically re-randomized seed.
//!
//! The seed defends against algorithmic-complexity attacks where an attacker crafts
//! keys that collide in a fixed hash function to force every lookup into one long
//! chain. Rekeying (see [`crate::engine`]) periodically replaces the seed and
//! re-buckets every live queue without destroying or reordering it.

use std::hash::Hasher;
use std::sync::atomic::{AtomicU32, Ordering};

use rand::Rng;
use rustc_hash::FxHasher;

use crate::key::ReassemblyKey;

/// Holds the current hash seed. Cheap to read from any thread; replaced wholesale
/// on rekey.
#[derive(Debug)]
pub struct HashSeed(AtomicU32);

impl HashSeed {
    /// Draws an initial seed from the process entropy source.
    pub fn new() -> Self {
        Self(AtomicU32::new(rand::thread_rng().gen()))
    }

    pub fn current(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    /// Draws a fresh seed without installing it. Kept separate from
    /// [`HashSeed::install`] so a caller can draw the new seed before taking
    /// any lock and only make it visible once it's safe to do so.
    pub fn draw() -> u32 {
        rand::thread_rng().gen()
    }

    /// Installs a previously-drawn seed.
    pub fn install(&self, seed: u32) {
        self.0.store(seed, Ordering::Relaxed);
    }
}

impl Default for HashSeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the bucket index for `key` given `seed` and a power-of-two `bucket_count`.
pub fn bucket_of(key: &ReassemblyKey, seed: u32, bucket_count: usize) -> usize {
    debug_assert!(bucket_count.is_power_of_two());
    let mut hasher = FxHasher::default();
    hasher.write_u32((key.identification as u32) << 16 | key.protocol as u32);
    hasher.write_u32(key.saddr);
    hasher.write_u32(key.daddr);
    hasher.write_u32(seed);
    (hasher.finish() as usize) & (bucket_count - 1)
}
