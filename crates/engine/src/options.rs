//! Engine, read, and write options.

use std::path::PathBuf;
use std::time::Duration;

/// Options for one read.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// Verify stored checksums on the read path. Forwarded to the engine;
    /// the in-memory reference engine has nothing to checksum and accepts
    /// it as a no-op.
    pub verify_checksum: bool,
}

/// Options for one write (or one atomic batch).
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Sync the WAL to disk before acknowledging the write.
    pub sync: bool,
    /// Skip the WAL for this write. Such writes do not survive a crash.
    pub disable_wal: bool,
}

/// Options fixed at open time.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Database directory.
    pub path: PathBuf,
    /// Create the directory if it does not exist.
    pub create_if_missing: bool,
    /// Time-to-live for every entry. `None` opens the plain engine.
    pub ttl: Option<Duration>,
    /// Fault-injection hint: abort the process with probability
    /// 1/`kill_odds` at write points. Zero disables.
    pub kill_odds: u32,
    /// Write-path buffer budget in bytes.
    pub write_buffer_size: usize,
    /// Rewrite the WAL down to live entries during open. `None` defers
    /// to the deterministic default draw (see `store::purge_draw`).
    pub purge_redundant_on_reopen: Option<bool>,
    /// Percentage feeding the default purge draw.
    pub purge_redundant_percent: u32,
    /// Issue fsync instead of fdatasync when syncing the WAL.
    pub use_fsync: bool,
    /// Skip the final data sync on graceful close.
    pub disable_data_sync: bool,
    /// Drop deletes addressed to keys the engine can prove absent.
    pub filter_deletes: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./siege-db"),
            create_if_missing: true,
            ttl: None,
            kill_odds: 0,
            write_buffer_size: 4 << 20,
            purge_redundant_on_reopen: None,
            purge_redundant_percent: 50,
            use_fsync: false,
            disable_data_sync: false,
            filter_deletes: false,
        }
    }
}

impl EngineOptions {
    /// Options for a database at `path`, everything else default.
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}
