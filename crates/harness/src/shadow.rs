//! The shadow model: expected database state, one `u32` per logical key.
//!
//! The table is the test's source of truth. Every write stores its value
//! base here before the engine sees it; every delete stores [`SENTINEL`].
//! Verification re-derives full value bytes from the base, so one word
//! per key is enough to check arbitrary-length values.
//!
//! # Locking discipline
//!
//! Entries are relaxed atomics, but that is not the synchronization
//! story: any modification of entry `k` and the corresponding engine
//! write must happen under `ShardLocks::guard(k)`. The atomics only make
//! the unsynchronized *reads* (verification after the workload has
//! quiesced, and the tolerated racy reads during it) defined behavior.

use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU32, Ordering};

use siege_core::SENTINEL;

/// Expected value base for every logical key in `[0, max_key)`.
pub struct ShadowTable {
    values: Vec<AtomicU32>,
}

impl ShadowTable {
    /// A table of `max_key` entries, all absent.
    pub fn new(max_key: u64) -> Self {
        let mut values = Vec::with_capacity(max_key as usize);
        values.resize_with(max_key as usize, || AtomicU32::new(SENTINEL));
        Self { values }
    }

    /// Expected base for `key`, or [`SENTINEL`].
    #[inline]
    pub fn get(&self, key: u64) -> u32 {
        self.values[key as usize].load(Ordering::Relaxed)
    }

    /// Record that `key` must now hold the value derived from `base`.
    #[inline]
    pub fn put(&self, key: u64, base: u32) {
        self.values[key as usize].store(base, Ordering::Relaxed);
    }

    /// Record that `key` must now be absent.
    #[inline]
    pub fn delete(&self, key: u64) {
        self.values[key as usize].store(SENTINEL, Ordering::Relaxed);
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for an empty key universe (never in a real run).
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Mutexes bucketing the key space into contiguous shards.
///
/// Key `k` belongs to lock `k >> log2_keys_per_lock`.
pub struct ShardLocks {
    locks: Vec<Mutex<()>>,
    log2_keys_per_lock: u32,
}

impl ShardLocks {
    /// Locks covering `[0, max_key)`, `2^log2_keys_per_lock` keys each.
    pub fn new(max_key: u64, log2_keys_per_lock: u32) -> Self {
        let per_lock = 1u64 << log2_keys_per_lock;
        let num_locks = max_key.div_ceil(per_lock) as usize;
        let mut locks = Vec::with_capacity(num_locks);
        locks.resize_with(num_locks, || Mutex::new(()));
        Self {
            locks,
            log2_keys_per_lock,
        }
    }

    /// Hold the shard lock for `key` while the guard lives.
    #[inline]
    pub fn guard(&self, key: u64) -> MutexGuard<'_, ()> {
        self.locks[(key >> self.log2_keys_per_lock) as usize].lock()
    }

    /// Number of shard locks.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True if no locks exist (empty key universe).
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
