//! Lock-free counters mirroring the kernel's `IPSTATS_MIB_REASM*` family.
//!
//! The engine owns these counters even though exporting them to a metrics
//! backend is outside its scope; a host process reads a [`StatsSnapshot`]
//! whenever it wants one.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Stats {
    reasm_reqds: AtomicU64,
    reasm_oks: AtomicU64,
    reasm_fails: AtomicU64,
    reasm_timeout: AtomicU64,
}

/// A point-in-time read of [`Stats`]'s counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub reasm_reqds: u64,
    pub reasm_oks: u64,
    pub reasm_fails: u64,
    pub reasm_timeout: u64,
}

impl Stats {
    pub fn incr_reqds(&self) {
        self.reasm_reqds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_oks(&self) {
        self.reasm_oks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_fails(&self) {
        self.reasm_fails.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_timeout(&self) {
        self.reasm_timeout.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reasm_reqds: self.reasm_reqds.load(Ordering::Relaxed),
            reasm_oks: self.reasm_oks.load(Ordering::Relaxed),
            reasm_fails: self.reasm_fails.load(Ordering::Relaxed),
            reasm_timeout: self.reasm_timeout.load(Ordering::Relaxed),
        }
    }
}
