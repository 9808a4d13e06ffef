//! The public entry point: `Engine::ingest` ties the memory accountant, queue
//! table, fragment list, and timers together into the single operation an IP
//! input path calls for every incoming fragment.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::checksum::ChecksumState;
use crate::config::EngineConfig;
use crate::error::{DropReason, EngineError, IngestResult};
use crate::fragment::{Datagram, RawFragment};
use crate::fragment_list::{self, InsertOutcome};
use crate::memory::MemoryAccountant;
use crate::notifier::Notifier;
use crate::queue::{Queue, QueueFlags, QueueState};
use crate::stats::{Stats, StatsSnapshot};
use crate::table::QueueTable;

/// Owns all process-wide state for one reassembly engine: the hash seed, the
/// queue table, the memory accountant, and the rekey timer. Constructed once
/// by `Engine::new` and shared as an `Arc` by every caller and timer task —
/// deliberately not a hidden static, so tests can run isolated engines in
/// parallel.
pub struct Engine {
    config: EngineConfig,
    table: QueueTable,
    accountant: Arc<MemoryAccountant>,
    stats: Stats,
    notifier: Arc<dyn Notifier>,
    rekey_task: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Validates `config`, then constructs an engine and starts its rekey
    /// timer. The rekey task holds only a `Weak` reference, so it exits
    /// quietly once the last `Arc<Engine>` is dropped instead of keeping the
    /// engine alive forever.
    pub fn new(config: EngineConfig, notifier: Arc<dyn Notifier>) -> Result<Arc<Self>, EngineError> {
        if config.low_watermark_bytes >= config.high_watermark_bytes {
            return Err(EngineError::InvalidWatermarks {
                low: config.low_watermark_bytes,
                high: config.high_watermark_bytes,
            });
        }
        if config.bucket_count == 0 || !config.bucket_count.is_power_of_two() {
            return Err(EngineError::InvalidBucketCount(config.bucket_count));
        }

        let accountant = Arc::new(MemoryAccountant::new(
            config.high_watermark_bytes,
            config.low_watermark_bytes,
        ));
        let table = QueueTable::new(config.bucket_count, accountant.clone());

        let engine = Arc::new(Self {
            config,
            table,
            accountant,
            stats: Stats::default(),
            notifier,
            rekey_task: Mutex::new(None),
        });

        let rekey_task = engine.spawn_rekey_task();
        *engine.rekey_task.lock().unwrap() = Some(rekey_task);

        Ok(engine)
    }

    /// Admits one fragment. This is the sole public operation callers need:
    /// it evicts under memory pressure, resolves or creates the fragment's
    /// queue, inserts it, and reassembles the datagram if that completes it.
    #[tracing::instrument(skip(self, raw), fields(id = raw.key.identification, proto = raw.key.protocol))]
    pub fn ingest(self: &Arc<Self>, raw: RawFragment) -> Result<IngestResult, EngineError> {
        if !raw.is_fragment() {
            return Err(EngineError::NotAFragment);
        }
        self.stats.incr_reqds();

        if self.accountant.over_high_watermark() {
            tracing::info!(
                current = self.accountant.current(),
                high = self.config.high_watermark_bytes,
                "high watermark exceeded, evicting"
            );
            self.evict_until(self.config.low_watermark_bytes);
        }

        let key = raw.key;
        let ttl = self.config.frag_ttl;
        let queue = self.table.find_or_create(key, |candidate| {
            let handle = self.spawn_expiry_timer(candidate.clone(), ttl);
            candidate.state.lock().unwrap().timer = Some(handle);
        });

        let mut became_pending = false;
        let result = {
            let mut state = queue.state.lock().unwrap();
            match fragment_list::insert(&mut state, raw, &self.accountant) {
                InsertOutcome::Dropped(reason) => IngestResult::Dropped(reason),
                InsertOutcome::Inserted => {
                    if state.is_fully_assembled() {
                        match self.reassemble(&queue, &mut state) {
                            Ok(datagram) => {
                                self.stats.incr_oks();
                                IngestResult::Delivered(datagram)
                            }
                            Err(reason) => {
                                self.stats.incr_fails();
                                IngestResult::Dropped(reason)
                            }
                        }
                    } else {
                        became_pending = true;
                        IngestResult::Pending
                    }
                }
            }
        };

        // The exclusive LRU move is deferred until the queue's own lock is
        // released: a queue that just became complete was already unlinked
        // by `reassemble`, so moving it to the tail first would be immediately
        // undone and is skipped entirely.
        if became_pending {
            self.table.move_to_tail(&queue);
        }

        Ok(result)
    }

    /// Kills every live queue without emitting ICMP notifications, as if the
    /// engine were shutting down.
    pub fn flush(&self) {
        self.evict_until(0);
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn memory_in_use(&self) -> usize {
        self.accountant.current()
    }

    pub fn queue_count(&self) -> usize {
        self.table.len()
    }

    /// Evicts the least-recently-used queues until accounted memory falls to
    /// or below `target_bytes`, or the table empties.
    fn evict_until(&self, target_bytes: usize) {
        while self.accountant.current() > target_bytes {
            let Some(queue) = self.table.lru_head() else {
                break;
            };
            let mut state = queue.state.lock().unwrap();
            if !state.is_complete() {
                self.kill_locked(&queue, &mut state);
            }
            // Matches the reference evictor, which increments REASMFAILS for
            // every queue it walks regardless of whether it actually killed
            // one (a queue can complete and unlink itself between lru_head()
            // and this lock acquisition).
            self.stats.incr_fails();
        }
    }

    /// Removes `queue` from the table and LRU, marks it complete, and cancels
    /// its timer. Idempotent: a queue already marked complete is left alone.
    fn kill_locked(&self, queue: &Arc<Queue>, state: &mut QueueState) {
        if state.is_complete() {
            return;
        }
        self.table.unlink(queue);
        state.flags.set(QueueFlags::COMPLETE);
        if let Some(handle) = state.timer.take() {
            handle.abort();
        }
    }

    /// Builds the reassembled datagram from a queue that has just satisfied
    /// the completeness test. Kills the queue first, matching the reference
    /// reassembly's `ipq_kill` call at the top of `ip_frag_reasm`.
    fn reassemble(&self, queue: &Arc<Queue>, state: &mut QueueState) -> Result<Datagram, DropReason> {
        self.kill_locked(queue, state);

        let total_len = state.header_len + state.total_length;
        if total_len > 65535 {
            tracing::warn!(total_len, "reassembled datagram exceeds 65535 bytes");
            return Err(DropReason::Oversize);
        }

        let mut payload = Vec::with_capacity(state.total_length);
        let mut checksum_state = ChecksumState::Unnecessary;
        for fragment in &state.fragments {
            payload.extend_from_slice(&fragment.payload);
            checksum_state = checksum_state.combine(fragment.checksum_state);
        }

        Ok(Datagram {
            key: queue.key,
            header_len: state.header_len,
            payload,
            checksum_state,
            device_id: state.device_id,
            timestamp: state.timestamp,
        })
    }

    /// The expiry-timer handler (§4.7): if the queue is still incomplete when
    /// the timer fires, request an ICMP notification (if possible) and kill it.
    fn expire(&self, queue: Arc<Queue>) {
        let mut state = queue.state.lock().unwrap();
        if state.is_complete() {
            return;
        }
        self.stats.incr_fails();
        self.stats.incr_timeout();
        if state.flags.is_set(QueueFlags::FIRST_IN) {
            if let Some(first) = state.fragments.iter().find(|f| f.payload_offset == 0) {
                self.notifier.on_expiry_notify(first);
            }
        }
        tracing::debug!(id = queue.key.identification, "reassembly queue expired");
        self.kill_locked(&queue, &mut state);
    }

    fn spawn_expiry_timer(self: &Arc<Self>, queue: Arc<Queue>, ttl: Duration) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            engine.expire(queue);
        })
    }

    fn spawn_rekey_task(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::downgrade(self);
        let interval = self.config.rekey_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match engine.upgrade() {
                    Some(engine) => {
                        tracing::debug!("rekeying reassembly hash seed");
                        engine.table.rekey();
                    }
                    None => break,
                }
            }
        })
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(handle) = self.rekey_task.lock().unwrap().take() {
            handle.abort();
        }
    }
}
