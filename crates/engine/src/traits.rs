//! The storage-engine adapter surface.
//!
//! Everything the harness requires from an engine under test lives in
//! these two traits. The reference [`KvEngine`](crate::KvEngine)
//! implements them honestly; test suites implement them dishonestly (an
//! engine that drops writes, a batch writer that applies nine of ten
//! steps) to prove the harness notices.
//!
//! # Status mapping
//!
//! The classic tri-state status (OK / NotFound / Error) maps to
//! `Result<Option<Vec<u8>>>`: `Ok(Some(v))` is a hit, `Ok(None)` is
//! NotFound, and `Err(_)` is an operation error the caller counts and
//! survives.

use siege_core::Result;

use crate::batch::WriteBatch;
use crate::options::{ReadOptions, WriteOptions};

/// An ordered key-value engine under stress.
///
/// All methods take `&self`; implementations are internally synchronized
/// and shared across worker threads behind an `Arc`.
pub trait StorageEngine: Send + Sync {
    /// Point lookup.
    fn get(&self, opts: &ReadOptions, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Set `key` to `value`.
    fn put(&self, opts: &WriteOptions, key: &[u8], value: &[u8]) -> Result<()>;

    /// Merge `value` into `key`. Engines under this harness must supply a
    /// merge operator that behaves semantically as a put.
    fn merge(&self, opts: &WriteOptions, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`.
    fn delete(&self, opts: &WriteOptions, key: &[u8]) -> Result<()>;

    /// Apply a batch atomically: concurrent snapshots observe all of its
    /// steps or none, and recovery never replays a partial batch.
    fn write(&self, opts: &WriteOptions, batch: WriteBatch) -> Result<()>;

    /// Ordered scan of every live entry whose key starts with `prefix`.
    fn scan_prefix(&self, opts: &ReadOptions, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Point-in-time view of the database. Released on drop.
    fn snapshot(&self) -> Box<dyn EngineSnapshot>;

    /// Discard all in-memory state without flushing and release the lock
    /// file, simulating a crash. Only persistent state (the WAL) survives
    /// into the next open.
    fn crash(&self) -> Result<()>;

    /// Graceful shutdown: flush, sync per the open options, release the
    /// lock file.
    fn close(&self) -> Result<()>;
}

/// A point-in-time view over a [`StorageEngine`].
///
/// Reads through a snapshot are repeatable: writes committed after the
/// snapshot was taken are invisible, and two reads of the same key return
/// the same answer.
pub trait EngineSnapshot: Send + Sync {
    /// Point lookup at the snapshot's moment.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Ordered prefix scan at the snapshot's moment.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}
