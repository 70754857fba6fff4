//! The per-thread workload driver.
//!
//! Each worker owns a seeded PRNG stream (`seed + 1000 + tid`), so the
//! sequence of (key, operation, value base) it produces is a pure
//! function of the configuration. Operations are classified by cumulative
//! probability in the fixed order read, prefix, write, delete.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

use siege_core::{codec::KEY_LEN, encode_key, generate_value, StressConfig};
use siege_engine::{ReadOptions, WriteOptions};

use crate::db::StressDb;
use crate::shared::SharedState;
use crate::stats::Stats;
use crate::verify;

/// Operation classes in their fixed probability order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Point read.
    Read,
    /// Prefix scan over the 7-byte key prefix.
    Prefix,
    /// Point write (or merge-as-put).
    Write,
    /// Point delete.
    Delete,
}

impl OpKind {
    /// Classify a draw from `[0, 100)` against the configured mix.
    pub fn classify(p: u32, config: &StressConfig) -> OpKind {
        let mut p = p;
        if p < config.readpercent {
            return OpKind::Read;
        }
        p -= config.readpercent;
        if p < config.prefixpercent {
            return OpKind::Prefix;
        }
        p -= config.prefixpercent;
        if p < config.writepercent {
            return OpKind::Write;
        }
        OpKind::Delete
    }
}

/// One worker thread's state.
pub struct Worker {
    pub(crate) tid: u32,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) stats: Stats,
    pub(crate) shared: Arc<SharedState>,
    pub(crate) db: Arc<StressDb>,
}

impl Worker {
    /// A worker with its own PRNG stream.
    pub fn new(tid: u32, shared: Arc<SharedState>, db: Arc<StressDb>) -> Self {
        let config = shared.config();
        let rng = ChaCha8Rng::seed_from_u64(config.seed + 1000 + u64::from(tid));
        let stats = Stats::new(config.histogram);
        Self {
            tid,
            rng,
            stats,
            shared,
            db,
        }
    }

    /// Walk the full lifecycle: wait for the pack, operate, verify, and
    /// hand back this thread's stats.
    pub fn run(mut self) -> Stats {
        self.shared.worker_initialized();

        if self.shared.config().test_batches_snapshots {
            self.operate_batched();
        } else {
            self.operate_point();
        }

        self.shared.worker_operated();

        if !self.shared.config().test_batches_snapshots {
            verify::verify_stride(&self.shared, &self.db, self.tid);
        }

        self.shared.worker_done();
        self.stats
    }

    /// Non-batch OPERATE loop (§4.4 semantics).
    fn operate_point(&mut self) {
        let shared = Arc::clone(&self.shared);
        let config = shared.config();
        let (Some(shadow), Some(locks)) = (shared.shadow(), shared.locks()) else {
            // Only reachable through misuse; batch mode takes the other path.
            return;
        };

        let read_opts = ReadOptions {
            verify_checksum: config.verify_checksum,
        };
        let write_opts = WriteOptions {
            sync: config.sync,
            disable_wal: config.disable_wal,
        };
        let ops_per_chunk = config.ops_per_chunk();

        self.stats.start();
        'ops: for i in 0..config.ops_per_thread {
            // A recorded fatal failure stops every worker at its next
            // operation; parked vote waiters are woken by the recorder.
            if self.shared.failed() {
                break;
            }
            if i != 0 && i % ops_per_chunk == 0 {
                self.stats.finished_single_op();
                self.shared.vote_reopen(&self.db);
            }

            let rand_key = self.rng.gen_range(0..config.max_key);
            let key = encode_key(rand_key);
            let p = self.rng.gen_range(0..100u32);
            let engine = self.db.engine();

            match OpKind::classify(p, config) {
                OpKind::Read => match engine.get(&read_opts, &key) {
                    Ok(Some(_)) => self.stats.add_gets(1, 1),
                    Ok(None) => self.stats.add_gets(1, 0),
                    Err(_) => self.stats.add_errors(1),
                },

                OpKind::Prefix => {
                    // Prefixes are everything except the last key byte,
                    // so at most 256 keys share one prefix.
                    let prefix = &key[..KEY_LEN - 1];
                    match engine.scan_prefix(&read_opts, prefix) {
                        Ok(hits) => {
                            for (k, _) in &hits {
                                assert!(
                                    k.starts_with(prefix),
                                    "prefix scan escaped its prefix"
                                );
                            }
                            assert!(hits.len() <= 256, "impossible population for a 7-byte prefix");
                            self.stats.add_prefixes(1, hits.len() as u64);
                        }
                        Err(_) => self.stats.add_errors(1),
                    }
                }

                OpKind::Write => {
                    let base = self.rng.next_u32();
                    let value = generate_value(base, config.value_size_mult);
                    let _guard = locks.guard(rand_key);
                    if config.verify_before_write {
                        if let Err(err) =
                            verify::verify_value(shadow, config, engine.as_ref(), rand_key, true)
                        {
                            // The database already diverged; do not issue
                            // the write, stop operating.
                            self.shared.record_failure(err);
                            break 'ops;
                        }
                    }
                    shadow.put(rand_key, base);
                    let result = if config.use_merge_put {
                        engine.merge(&write_opts, &key, &value)
                    } else {
                        engine.put(&write_opts, &key, &value)
                    };
                    match result {
                        Ok(()) => self.stats.add_bytes_for_writes(1, value.len() as u64),
                        Err(_) => self.stats.add_errors(1),
                    }
                    drop(_guard);
                    if config.verbose {
                        print_key_value(rand_key, &value);
                    }
                }

                OpKind::Delete => {
                    let _guard = locks.guard(rand_key);
                    shadow.delete(rand_key);
                    match engine.delete(&write_opts, &key) {
                        Ok(()) => self.stats.add_deletes(1),
                        Err(_) => self.stats.add_errors(1),
                    }
                }
            }

            self.stats.finished_single_op();
        }
        self.stats.stop();
    }

    /// Batch/snapshot OPERATE loop (§4.5 semantics).
    fn operate_batched(&mut self) {
        let shared = Arc::clone(&self.shared);
        let config = shared.config();
        let write_opts = WriteOptions {
            sync: config.sync,
            disable_wal: config.disable_wal,
        };
        let ops_per_chunk = config.ops_per_chunk();

        self.stats.start();
        for i in 0..config.ops_per_thread {
            if self.shared.failed() {
                break;
            }
            if i != 0 && i % ops_per_chunk == 0 {
                self.stats.finished_single_op();
                self.shared.vote_reopen(&self.db);
            }

            let rand_key = self.rng.gen_range(0..config.max_key);
            let key = encode_key(rand_key);
            let p = self.rng.gen_range(0..100u32);

            match OpKind::classify(p, config) {
                OpKind::Read => self.multi_get(&key),
                OpKind::Prefix => self.multi_prefix_scan(&key[..KEY_LEN - 1]),
                OpKind::Write => {
                    let base = self.rng.next_u32();
                    let value = generate_value(base, config.value_size_mult);
                    self.multi_put(&write_opts, &key, &value);
                }
                OpKind::Delete => self.multi_delete(&write_opts, &key),
            }

            self.stats.finished_single_op();
        }
        self.stats.stop();
    }

    /// Consume the worker, yielding its stats (tests only need this when
    /// driving phases by hand).
    pub fn into_stats(self) -> Stats {
        self.stats
    }
}

/// Verbose dump of one written key/value.
fn print_key_value(key: u64, value: &[u8]) {
    let hex: String = value.iter().map(|b| format!("{:X}", b)).collect();
    println!("{} ==> ({}) {}", key, value.len(), hex);
}
