//! Run configuration.
//!
//! All ~25 knobs of a stress run live in one plain `StressConfig` value,
//! built once at startup and passed by reference from then on. The CLI
//! fills it from flags, optionally underlaid by a TOML file; tests build
//! it with struct-update syntax from `Default`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SiegeError};

/// Configuration for one stress run.
///
/// Defaults reproduce the classic heavy-write profile: 10% reads, 25%
/// prefix scans, 50% writes, 15% deletes across 32 threads.
///
/// # Example
///
/// ```
/// use siege_core::StressConfig;
///
/// let config = StressConfig {
///     threads: 2,
///     max_key: 128,
///     ops_per_thread: 100,
///     reopen: 0,
///     ..StressConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    /// Base for all PRNG streams. Thread `t` seeds its generator with
    /// `seed + 1000 + t`, so a run is fully determined by seed and
    /// thread count.
    pub seed: u64,
    /// Size of the key universe (and of the shadow table).
    pub max_key: u64,
    /// Number of worker threads.
    pub threads: u32,
    /// Operations each worker performs during OPERATE.
    pub ops_per_thread: u64,
    /// Number of mid-run crash-recovery reopens. Splits OPERATE into
    /// `reopen + 1` equal chunks per thread.
    pub reopen: u32,

    /// Percentage of operations that are point reads.
    pub readpercent: u32,
    /// Percentage of operations that are prefix scans.
    pub prefixpercent: u32,
    /// Percentage of operations that are point writes.
    pub writepercent: u32,
    /// Percentage of operations that are point deletes.
    pub delpercent: u32,

    /// Log2 of the number of logical keys guarded by one shard lock.
    pub log2_keys_per_lock: u32,
    /// Value length multiplier; value lengths are 1x, 2x, or 3x this.
    pub value_size_mult: usize,

    /// Switch to batch/snapshot mode (ten-lane MultiPut/MultiGet). The
    /// shadow model is not allocated in this mode.
    pub test_batches_snapshots: bool,
    /// Run a strict shadow check before every write.
    pub verify_before_write: bool,
    /// Ask the engine to verify block checksums on reads.
    pub verify_checksum: bool,

    /// Do not write the WAL. Incompatible with `reopen > 0`.
    pub disable_wal: bool,
    /// Sync every write to disk before acknowledging it.
    pub sync: bool,
    /// Issue fsync instead of fdatasync when syncing.
    pub use_fsync: bool,
    /// Do not wait for data-file writes to reach disk.
    pub disable_data_sync: bool,

    /// Open a TTL variant of the database with this lifetime in seconds.
    /// Pick a value comfortably longer than the run, or verification of
    /// still-live keys will fail.
    pub ttl: Option<u64>,
    /// Fault-injection hint forwarded to the engine: kill with
    /// probability 1/this at engine-chosen points. Zero disables.
    pub kill_random_test: u32,

    /// Collect and print a latency histogram.
    pub histogram: bool,
    /// Print every key/value written.
    pub verbose: bool,

    /// Destroy the database directory before starting.
    pub destroy_db_initially: bool,
    /// Database directory.
    pub db_path: PathBuf,

    /// Engine memtable budget in bytes before a flush is scheduled.
    pub write_buffer_size: usize,
    /// Percentage of runs that rewrite the WAL to live entries on reopen.
    /// Measured against a PRNG of fixed seed 1000, so the decision is
    /// deterministic across invocations and independent of `seed`.
    pub purge_redundant_percent: u32,
    /// Let the engine drop deletes for keys it can prove absent.
    pub filter_deletes: bool,
    /// Replace every put with a merge that behaves as a put.
    pub use_merge_put: bool,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            seed: 2_341_234,
            max_key: 1 << 30,
            threads: 32,
            ops_per_thread: 600_000,
            reopen: 10,
            readpercent: 10,
            prefixpercent: 25,
            writepercent: 50,
            delpercent: 15,
            log2_keys_per_lock: 2,
            value_size_mult: 8,
            test_batches_snapshots: false,
            verify_before_write: false,
            verify_checksum: false,
            disable_wal: false,
            sync: false,
            use_fsync: false,
            disable_data_sync: false,
            ttl: None,
            kill_random_test: 0,
            histogram: false,
            verbose: false,
            destroy_db_initially: true,
            db_path: PathBuf::from("./siege-db"),
            write_buffer_size: 4 << 20,
            purge_redundant_percent: 50,
            filter_deletes: false,
            use_merge_put: false,
        }
    }
}

impl StressConfig {
    /// Load a configuration from a TOML file.
    ///
    /// Missing fields take their defaults, so a partial file is fine.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| SiegeError::config(format!("{}: {}", path.display(), e)))
    }

    /// Check the startup constraints.
    ///
    /// # Errors
    ///
    /// Returns `SiegeError::Config` if:
    /// - the four operation percentages do not sum to exactly 100
    /// - the WAL is disabled while reopens are requested (unrecoverable)
    /// - `reopen >= ops_per_thread` (chunks would be empty)
    /// - `threads` or `max_key` is zero
    /// - `value_size_mult < 4` (values could not hold the base header)
    pub fn validate(&self) -> Result<()> {
        let sum = self.readpercent + self.prefixpercent + self.writepercent + self.delpercent;
        if sum != 100 {
            return Err(SiegeError::config(format!(
                "read+prefix+write+delete percents != 100 (got {})",
                sum
            )));
        }
        if self.disable_wal && self.reopen > 0 {
            return Err(SiegeError::config(
                "cannot reopen safely with the WAL disabled",
            ));
        }
        if u64::from(self.reopen) >= self.ops_per_thread {
            return Err(SiegeError::config(format!(
                "reopens ({}) must be < ops_per_thread ({})",
                self.reopen, self.ops_per_thread
            )));
        }
        if self.threads == 0 {
            return Err(SiegeError::config("threads must be >= 1"));
        }
        if self.max_key == 0 {
            return Err(SiegeError::config("max_key must be >= 1"));
        }
        if self.value_size_mult < 4 {
            return Err(SiegeError::config(format!(
                "value_size_mult ({}) must be >= 4",
                self.value_size_mult
            )));
        }
        Ok(())
    }

    /// Operations per OPERATE chunk: workers vote for a reopen every this
    /// many operations.
    pub fn ops_per_chunk(&self) -> u64 {
        self.ops_per_thread / (u64::from(self.reopen) + 1)
    }

    /// Number of shard locks covering `[0, max_key)`.
    pub fn num_shard_locks(&self) -> usize {
        let per_lock = 1u64 << self.log2_keys_per_lock;
        (self.max_key.div_ceil(per_lock)) as usize
    }
}
