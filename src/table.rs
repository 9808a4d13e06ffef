//! The chained hash table of in-progress reassemblies, plus the LRU ordering
//! used by the evictor.
//!
//! Bucket chains and the LRU list share one `RwLock`: shared for lookups,
//! exclusive for any structural edit (insert, unlink, move-to-tail, rekey).
//! This makes the spec's "table_lock before Q.lock, never the reverse"
//! ordering trivially satisfiable — there is exactly one lock guarding all
//! table structure, and nothing here ever touches a queue's own `Mutex`.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use crate::hash::{bucket_of, HashSeed};
use crate::key::ReassemblyKey;
use crate::memory::MemoryAccountant;
use crate::queue::Queue;

struct TableInner {
    buckets: Vec<Vec<Arc<Queue>>>,
    lru: VecDeque<Arc<Queue>>,
}

pub struct QueueTable {
    inner: RwLock<TableInner>,
    seed: HashSeed,
    bucket_count: usize,
    accountant: Arc<MemoryAccountant>,
}

impl QueueTable {
    pub fn new(bucket_count: usize, accountant: Arc<MemoryAccountant>) -> Self {
        debug_assert!(bucket_count.is_power_of_two() && bucket_count > 0);
        Self {
            inner: RwLock::new(TableInner {
                buckets: vec![Vec::new(); bucket_count],
                lru: VecDeque::new(),
            }),
            seed: HashSeed::new(),
            bucket_count,
            accountant,
        }
    }

    /// Finds the queue for `key`, or creates and publishes a new one.
    ///
    /// `on_create` runs exactly once, under the table's exclusive lock, iff a
    /// new queue is published — this is where the caller starts the queue's
    /// expiry timer, so "published in the table" and "has a running timer"
    /// become true atomically with respect to any concurrent rekey or lookup.
    pub fn find_or_create(
        &self,
        key: ReassemblyKey,
        on_create: impl FnOnce(&Arc<Queue>),
    ) -> Arc<Queue> {
        {
            let inner = self.inner.read().unwrap();
            let bucket = bucket_of(&key, self.seed.current(), self.bucket_count);
            if let Some(existing) = inner.buckets[bucket].iter().find(|q| q.key == key) {
                return existing.clone();
            }
        }

        let candidate = Arc::new(Queue::new(key, self.accountant.clone()));

        let mut inner = self.inner.write().unwrap();
        let bucket = bucket_of(&key, self.seed.current(), self.bucket_count);
        if let Some(existing) = inner.buckets[bucket].iter().find(|q| q.key == key) {
            // Lost the race between the read-path check and taking the write
            // lock; the candidate we built is simply dropped.
            return existing.clone();
        }
        on_create(&candidate);
        inner.buckets[bucket].push(candidate.clone());
        inner.lru.push_back(candidate.clone());
        candidate
    }

    /// Removes `q` from its bucket chain and the LRU list. Safe to call more
    /// than once; the second call is a no-op.
    pub fn unlink(&self, q: &Arc<Queue>) {
        let mut inner = self.inner.write().unwrap();
        let bucket = bucket_of(&q.key, self.seed.current(), self.bucket_count);
        if let Some(pos) = inner.buckets[bucket].iter().position(|x| Arc::ptr_eq(x, q)) {
            inner.buckets[bucket].remove(pos);
        } else {
            for chain in inner.buckets.iter_mut() {
                if let Some(pos) = chain.iter().position(|x| Arc::ptr_eq(x, q)) {
                    chain.remove(pos);
                    break;
                }
            }
        }
        if let Some(pos) = inner.lru.iter().position(|x| Arc::ptr_eq(x, q)) {
            inner.lru.remove(pos);
        }
    }

    /// Moves `q` to the tail of the LRU list, marking it most-recently-used.
    pub fn move_to_tail(&self, q: &Arc<Queue>) {
        let mut inner = self.inner.write().unwrap();
        if let Some(pos) = inner.lru.iter().position(|x| Arc::ptr_eq(x, q)) {
            let q = inner.lru.remove(pos).unwrap();
            inner.lru.push_back(q);
        }
    }

    /// Returns the least-recently-used queue, the evictor's next victim.
    pub fn lru_head(&self) -> Option<Arc<Queue>> {
        self.inner.read().unwrap().lru.front().cloned()
    }

    /// Reseeds the hash and relinks every live queue into its new bucket.
    /// Does not touch the LRU order or any queue's fields.
    ///
    /// The new seed is drawn up front but not installed until the table's
    /// write lock is held: installing it any earlier would let a concurrent
    /// `find_or_create`/`unlink` compute a bucket index against the new seed
    /// while `inner.buckets` is still laid out under the old one, causing a
    /// lookup miss and a duplicate queue for the same key.
    pub fn rekey(&self) {
        let new_seed = HashSeed::draw();
        let mut inner = self.inner.write().unwrap();
        self.seed.install(new_seed);
        let mut rebucketed = vec![Vec::new(); self.bucket_count];
        for chain in inner.buckets.drain(..) {
            for q in chain {
                let bucket = bucket_of(&q.key, new_seed, self.bucket_count);
                rebucketed[bucket].push(q);
            }
        }
        inner.buckets = rebucketed;
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read().unwrap();
        inner.lru.is_empty() && inner.buckets.iter().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().lru.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: u16) -> ReassemblyKey {
        ReassemblyKey::new(id, 1, 2, 17)
    }

    fn table(bucket_count: usize) -> QueueTable {
        QueueTable::new(bucket_count, Arc::new(MemoryAccountant::new(262_144, 196_608)))
    }

    #[test]
    fn find_or_create_is_idempotent_per_key() {
        let table = table(64);
        let mut created = 0;
        let a = table.find_or_create(key(1), |_| created += 1);
        let b = table.find_or_create(key(1), |_| created += 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(created, 1);
    }

    #[test]
    fn rekey_preserves_lookup() {
        let table = table(64);
        let a = table.find_or_create(key(1), |_| {});
        table.rekey();
        let b = table.find_or_create(key(1), |_| {});
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn unlink_removes_from_both_structures() {
        let table = table(64);
        let q = table.find_or_create(key(1), |_| {});
        assert_eq!(table.len(), 1);
        table.unlink(&q);
        assert!(table.is_empty());
    }
}
