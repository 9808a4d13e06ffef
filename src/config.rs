//! Engine configuration. The host process owns loading this from sysctls, a
//! config file, or environment variables; this crate only defines the shape
//! and its defaults.

use std::time::Duration;

/// Tunables for one [`crate::engine::Engine`] instance.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Eviction triggers once total accounted bytes exceed this.
    pub high_watermark_bytes: usize,
    /// Eviction runs until total accounted bytes fall to or below this.
    pub low_watermark_bytes: usize,
    /// How long an incomplete queue may sit idle before it is killed and, if
    /// possible, reported via `on_expiry_notify`.
    pub frag_ttl: Duration,
    /// How often the hash seed is replaced and every queue re-bucketed.
    pub rekey_interval: Duration,
    /// Number of chains in the queue table. Must be a nonzero power of two.
    pub bucket_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            high_watermark_bytes: 262_144,
            low_watermark_bytes: 196_608,
            frag_ttl: Duration::from_secs(30),
            rekey_interval: Duration::from_secs(600),
            bucket_count: 64,
        }
    }
}
