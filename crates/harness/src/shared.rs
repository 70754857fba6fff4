//! State shared by all workers of one run.
//!
//! One `SharedState` is built per run and handed to every worker by
//! `Arc`; nothing here is a global. It owns the shadow model, the shard
//! locks, and the mutex/condvar pair gating the four phases:
//!
//! ```text
//! INIT ──(all arrived)──▶ OPERATE ──(all finished)──▶ VERIFY ──(all verified)──▶ DONE
//! ```
//!
//! Workers bump a counter per transition and the last one through
//! notifies; the main thread flips `start` / `start_verify` to release
//! the pack. Inside OPERATE the same condvar also serves the reopen
//! votes: `vote_reopen` counts modulo the thread count, and the voter
//! that rolls it back to zero performs the reopen while everyone else
//! waits for the round number to advance.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use siege_core::{Result, SiegeError, StressConfig};

use crate::db::StressDb;
use crate::shadow::{ShadowTable, ShardLocks};

/// Counters and flags behind the shared mutex.
#[derive(Debug, Default)]
struct Progress {
    num_initialized: u32,
    num_operated: u32,
    num_done: u32,
    vote_reopen: u32,
    reopen_rounds: u32,
    start: bool,
    start_verify: bool,
}

/// Everything the workers of one run share.
pub struct SharedState {
    config: StressConfig,
    /// Absent in batch/snapshot mode.
    shadow: Option<ShadowTable>,
    /// Absent in batch/snapshot mode.
    locks: Option<ShardLocks>,
    progress: Mutex<Progress>,
    cond: Condvar,
    failed: AtomicBool,
    failure: Mutex<Option<SiegeError>>,
}

impl SharedState {
    /// Build the shared state for `config`.
    ///
    /// In batch mode neither the shadow table nor the shard locks are
    /// allocated; the cross-lane checks replace them.
    pub fn new(config: StressConfig) -> Arc<Self> {
        let (shadow, locks) = if config.test_batches_snapshots {
            tracing::info!("no lock creation because test_batches_snapshots is set");
            (None, None)
        } else {
            tracing::info!(locks = config.num_shard_locks(), "creating shard locks");
            (
                Some(ShadowTable::new(config.max_key)),
                Some(ShardLocks::new(config.max_key, config.log2_keys_per_lock)),
            )
        };

        Arc::new(Self {
            config,
            shadow,
            locks,
            progress: Mutex::new(Progress::default()),
            cond: Condvar::new(),
            failed: AtomicBool::new(false),
            failure: Mutex::new(None),
        })
    }

    /// The run configuration.
    pub fn config(&self) -> &StressConfig {
        &self.config
    }

    /// The shadow table, absent in batch mode.
    pub fn shadow(&self) -> Option<&ShadowTable> {
        self.shadow.as_ref()
    }

    /// The shard locks, absent in batch mode.
    pub fn locks(&self) -> Option<&ShardLocks> {
        self.locks.as_ref()
    }

    // ------------------------------------------------------------------
    // Phase barriers
    // ------------------------------------------------------------------

    /// Worker side of INIT: announce arrival, then wait for the start
    /// signal.
    pub fn worker_initialized(&self) {
        let mut progress = self.progress.lock();
        progress.num_initialized += 1;
        if progress.num_initialized >= self.config.threads {
            self.cond.notify_all();
        }
        while !progress.start {
            self.cond.wait(&mut progress);
        }
    }

    /// Main side of INIT: wait for every worker, then release them into
    /// OPERATE.
    pub fn main_start_operate(&self) {
        let mut progress = self.progress.lock();
        while progress.num_initialized < self.config.threads {
            self.cond.wait(&mut progress);
        }
        tracing::info!("starting database operations");
        progress.start = true;
        self.cond.notify_all();
    }

    /// Worker side of the OPERATE→VERIFY transition.
    pub fn worker_operated(&self) {
        let mut progress = self.progress.lock();
        progress.num_operated += 1;
        if progress.num_operated >= self.config.threads {
            self.cond.notify_all();
        }
        while !progress.start_verify {
            self.cond.wait(&mut progress);
        }
    }

    /// Main side of the OPERATE→VERIFY transition.
    pub fn main_start_verify(&self) {
        let mut progress = self.progress.lock();
        while progress.num_operated < self.config.threads {
            self.cond.wait(&mut progress);
        }
        if self.config.test_batches_snapshots {
            tracing::info!("limited verification already done during gets");
        } else {
            tracing::info!("starting verification");
        }
        progress.start_verify = true;
        self.cond.notify_all();
    }

    /// Worker side of DONE.
    pub fn worker_done(&self) {
        let mut progress = self.progress.lock();
        progress.num_done += 1;
        if progress.num_done >= self.config.threads {
            self.cond.notify_all();
        }
    }

    /// Main side of DONE: wait for every worker to finish verification.
    pub fn main_wait_done(&self) {
        let mut progress = self.progress.lock();
        while progress.num_done < self.config.threads {
            self.cond.wait(&mut progress);
        }
    }

    // ------------------------------------------------------------------
    // Reopen coordination
    // ------------------------------------------------------------------

    /// Cast this worker's reopen vote for the current chunk boundary.
    ///
    /// The vote counter runs modulo the thread count; the worker whose
    /// vote rolls it back to zero performs the reopen while the rest wait
    /// for the round number to advance. No worker returns until the
    /// reopen for this boundary has happened, so every thread finishes
    /// its chunk before any thread starts the next one.
    ///
    /// A failed reopen is fatal: the round number does not advance, the
    /// failure is recorded, and every waiter wakes to find the run
    /// aborting. No worker dispatches another chunk against a database
    /// that failed to come back.
    pub fn vote_reopen(&self, db: &StressDb) {
        let mut progress = self.progress.lock();
        if self.failed.load(Ordering::Acquire) {
            return;
        }
        progress.vote_reopen = (progress.vote_reopen + 1) % self.config.threads;
        if progress.vote_reopen == 0 {
            match db.reopen() {
                Ok(()) => {
                    progress.reopen_rounds += 1;
                    self.cond.notify_all();
                }
                Err(err) => {
                    tracing::error!(error = %err, "reopen failed");
                    drop(progress);
                    self.record_failure(err);
                }
            }
        } else {
            let round = progress.reopen_rounds;
            while progress.reopen_rounds == round && !self.failed.load(Ordering::Acquire) {
                self.cond.wait(&mut progress);
            }
        }
    }

    // ------------------------------------------------------------------
    // Failure reporting
    // ------------------------------------------------------------------

    /// Record a fatal failure; the first one wins.
    ///
    /// Workers poll [`Self::failed`] before every operation and verify
    /// step, so the run stops at the next boundary. The notify below is
    /// issued under the progress mutex so a voter mid-park cannot miss
    /// it and wait out a reopen round that will never complete.
    pub fn record_failure(&self, err: SiegeError) {
        debug_assert!(err.is_fatal(), "per-operation errors belong in stats");
        {
            let mut slot = self.failure.lock();
            if slot.is_none() {
                tracing::error!(error = %err, "recording run failure");
                *slot = Some(err);
            }
        }
        self.failed.store(true, Ordering::Release);
        let _progress = self.progress.lock();
        self.cond.notify_all();
    }

    /// Has any worker recorded a fatal failure?
    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Consume the recorded failure, if any.
    pub fn take_failure(&self) -> Result<()> {
        match self.failure.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
