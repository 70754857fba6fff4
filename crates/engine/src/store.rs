//! Reference engine: an ordered, versioned, WAL-backed store.
//!
//! # Design
//!
//! - Index: `RwLock<BTreeMap<key, VersionChain>>`, ordered, so prefix
//!   scans are range scans.
//! - Version chains keep entries newest-first; a `None` value is a
//!   tombstone. Chains are trimmed down to what active snapshots can
//!   still observe.
//! - A global `AtomicU64` version stamps every atomic unit (one write or
//!   one whole batch); snapshots capture the counter and read at-or-below
//!   it, which is what makes batches all-or-nothing to readers.
//! - Durability is the WAL (`wal.rs`). `crash()` discards the index and
//!   releases the lock file without flushing; the next open replays the
//!   log.
//!
//! # TTL
//!
//! With `EngineOptions::ttl` set, every write is stamped with an expiry
//! and expired entries read as absent. WAL records carry no expiry, so a
//! recovered entry's lifetime restarts at replay; callers that reopen
//! mid-run pick a ttl comfortably longer than the run.

use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::io::ErrorKind;
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use siege_core::{Result, SiegeError};

use crate::batch::{BatchOp, WriteBatch};
use crate::options::{EngineOptions, ReadOptions, WriteOptions};
use crate::snapshot::KvSnapshot;
use crate::traits::{EngineSnapshot, StorageEngine};
use crate::wal::{self, WalWriter};

const LOCK_FILE: &str = "LOCK";

// ============================================================================
// Version chains
// ============================================================================

/// One version of one key.
#[derive(Debug, Clone)]
struct StoredEntry {
    version: u64,
    /// `None` is a tombstone.
    value: Option<Vec<u8>>,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Versions of a key, newest first.
#[derive(Debug, Default)]
struct VersionChain {
    versions: VecDeque<StoredEntry>,
}

impl VersionChain {
    fn push(&mut self, entry: StoredEntry) {
        self.versions.push_front(entry);
    }

    /// Newest entry at or below `max_version`.
    fn visible_at(&self, max_version: u64) -> Option<&StoredEntry> {
        self.versions.iter().find(|e| e.version <= max_version)
    }

    /// Drop versions nothing can observe anymore: an entry is dead once a
    /// newer entry also sits at or below `floor`.
    fn gc(&mut self, floor: u64) {
        while self.versions.len() > 1 {
            let second_oldest = self.versions[self.versions.len() - 2].version;
            if second_oldest <= floor {
                self.versions.pop_back();
            } else {
                break;
            }
        }
    }
}

// ============================================================================
// Engine internals
// ============================================================================

pub(crate) struct EngineInner {
    index: RwLock<BTreeMap<Vec<u8>, VersionChain>>,
    version: AtomicU64,
    /// `None` once the engine crashed or closed.
    wal: Mutex<Option<WalWriter>>,
    /// Active snapshot versions with refcounts; the minimum is the GC floor.
    snapshots: Mutex<BTreeMap<u64, usize>>,
    closed: AtomicBool,
    options: EngineOptions,
}

impl EngineInner {
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SiegeError::engine("database is closed"));
        }
        Ok(())
    }

    /// Fault-injection hint: die here with probability 1/kill_odds.
    fn maybe_kill(&self) {
        let odds = self.options.kill_odds;
        if odds > 0 && rand::thread_rng().gen_ratio(1, odds) {
            tracing::error!("kill_odds fired, aborting to simulate a crash");
            std::process::abort();
        }
    }

    fn gc_floor(&self, current: u64) -> u64 {
        self.snapshots
            .lock()
            .keys()
            .next()
            .copied()
            .unwrap_or(current)
    }

    /// Apply one atomic unit: log it, then install every step under a
    /// single new version while still holding the index guard.
    fn apply_write(&self, opts: &WriteOptions, mut ops: Vec<BatchOp>) -> Result<()> {
        self.check_open()?;
        self.maybe_kill();

        let mut index = self.index.write();

        if self.options.filter_deletes {
            ops.retain(|op| match op {
                BatchOp::Delete { key } => index
                    .get(key)
                    .and_then(|chain| chain.visible_at(u64::MAX))
                    .map_or(false, |e| e.value.is_some() && !e.is_expired()),
                _ => true,
            });
            if ops.is_empty() {
                return Ok(());
            }
        }

        if !opts.disable_wal {
            let mut wal = self.wal.lock();
            let writer = wal
                .as_mut()
                .ok_or_else(|| SiegeError::engine("wal writer gone"))?;
            writer.append(&ops, opts.sync)?;
        }

        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        let expires_at = self.options.ttl.map(|ttl| Instant::now() + ttl);
        let floor = self.gc_floor(version);

        for op in ops {
            let (key, value) = match op {
                BatchOp::Put { key, value } | BatchOp::Merge { key, value } => (key, Some(value)),
                BatchOp::Delete { key } => (key, None),
            };
            let chain = index.entry(key).or_default();
            chain.push(StoredEntry {
                version,
                value,
                expires_at,
            });
            chain.gc(floor);
        }
        Ok(())
    }

    pub(crate) fn read_at(&self, key: &[u8], max_version: u64) -> Option<Vec<u8>> {
        let index = self.index.read();
        index
            .get(key)
            .and_then(|chain| chain.visible_at(max_version))
            .filter(|e| !e.is_expired())
            .and_then(|e| e.value.clone())
    }

    pub(crate) fn scan_at(&self, prefix: &[u8], max_version: u64) -> Vec<(Vec<u8>, Vec<u8>)> {
        let index = self.index.read();
        index
            .range(prefix_range(prefix))
            .filter_map(|(key, chain)| {
                chain
                    .visible_at(max_version)
                    .filter(|e| !e.is_expired())
                    .and_then(|e| e.value.as_ref())
                    .map(|v| (key.clone(), v.clone()))
            })
            .collect()
    }

    pub(crate) fn register_snapshot(&self, version: u64) {
        *self.snapshots.lock().entry(version).or_insert(0) += 1;
    }

    pub(crate) fn release_snapshot(&self, version: u64) {
        let mut snapshots = self.snapshots.lock();
        if let Some(count) = snapshots.get_mut(&version) {
            *count -= 1;
            if *count == 0 {
                snapshots.remove(&version);
            }
        }
    }
}

/// Half-open key range covered by `prefix`.
fn prefix_range(prefix: &[u8]) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let start = Bound::Included(prefix.to_vec());
    let mut end = prefix.to_vec();
    while let Some(last) = end.last_mut() {
        if *last == 0xff {
            end.pop();
        } else {
            *last += 1;
            return (start, Bound::Excluded(end));
        }
    }
    (start, Bound::Unbounded)
}

// ============================================================================
// KvEngine
// ============================================================================

/// The default draw deciding whether reopen rewrites the WAL to live
/// entries. Seeded with a fixed 1000: the decision varies with the purge
/// percentage but is identical across invocations and independent of the
/// workload seed.
fn purge_draw() -> u32 {
    static DRAW: OnceLock<u32> = OnceLock::new();
    *DRAW.get_or_init(|| ChaCha8Rng::seed_from_u64(1000).gen_range(0..100))
}

/// Ordered, WAL-backed reference engine.
///
/// Cheap to clone (shared internals); all clones observe the same state.
#[derive(Clone)]
pub struct KvEngine {
    inner: Arc<EngineInner>,
}

impl KvEngine {
    /// Open the database in `options.path`, recovering from its WAL.
    ///
    /// # Errors
    ///
    /// - `LockHeld` if another live engine owns the directory
    /// - `Corruption` for mid-file WAL damage
    /// - `Io` for everything the filesystem can do wrong
    pub fn open(options: EngineOptions) -> Result<Self> {
        if options.create_if_missing {
            fs::create_dir_all(&options.path)?;
        } else if !options.path.is_dir() {
            return Err(SiegeError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("no database at {}", options.path.display()),
            )));
        }

        // Exclusive lock file; a crash leaves none behind.
        let lock_path = options.path.join(LOCK_FILE);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(SiegeError::LockHeld(options.path.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        let records = wal::replay(&options.path)?;
        let expires_at = options.ttl.map(|ttl| Instant::now() + ttl);
        let mut index: BTreeMap<Vec<u8>, VersionChain> = BTreeMap::new();
        let mut version = 0u64;
        for ops in records {
            version += 1;
            for op in ops {
                let (key, value) = match op {
                    BatchOp::Put { key, value } | BatchOp::Merge { key, value } => {
                        (key, Some(value))
                    }
                    BatchOp::Delete { key } => (key, None),
                };
                let chain = index.entry(key).or_default();
                chain.push(StoredEntry {
                    version,
                    value,
                    expires_at,
                });
                chain.gc(version);
            }
        }

        let purge = options
            .purge_redundant_on_reopen
            .unwrap_or_else(|| purge_draw() < options.purge_redundant_percent.saturating_sub(1));
        if purge {
            let live = index.iter().filter_map(|(key, chain)| {
                chain
                    .visible_at(u64::MAX)
                    .filter(|e| !e.is_expired())
                    .and_then(|e| e.value.as_ref())
                    .map(|v| (key.as_slice(), v.as_slice()))
            });
            wal::rewrite(&options.path, live)?;
        }

        let writer = WalWriter::open(&options.path, options.use_fsync, options.write_buffer_size)?;

        Ok(Self {
            inner: Arc::new(EngineInner {
                index: RwLock::new(index),
                version: AtomicU64::new(version),
                wal: Mutex::new(Some(writer)),
                snapshots: Mutex::new(BTreeMap::new()),
                closed: AtomicBool::new(false),
                options,
            }),
        })
    }

    /// Database directory.
    pub fn path(&self) -> &Path {
        &self.inner.options.path
    }
}

impl StorageEngine for KvEngine {
    fn get(&self, _opts: &ReadOptions, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.check_open()?;
        Ok(self.inner.read_at(key, u64::MAX))
    }

    fn put(&self, opts: &WriteOptions, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.apply_write(
            opts,
            vec![BatchOp::Put {
                key: key.to_vec(),
                value: value.to_vec(),
            }],
        )
    }

    fn merge(&self, opts: &WriteOptions, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.apply_write(
            opts,
            vec![BatchOp::Merge {
                key: key.to_vec(),
                value: value.to_vec(),
            }],
        )
    }

    fn delete(&self, opts: &WriteOptions, key: &[u8]) -> Result<()> {
        self.inner
            .apply_write(opts, vec![BatchOp::Delete { key: key.to_vec() }])
    }

    fn write(&self, opts: &WriteOptions, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return self.inner.check_open();
        }
        self.inner.apply_write(opts, batch.into_ops())
    }

    fn scan_prefix(&self, _opts: &ReadOptions, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.check_open()?;
        Ok(self.inner.scan_at(prefix, u64::MAX))
    }

    fn snapshot(&self) -> Box<dyn EngineSnapshot> {
        let version = self.inner.version.load(Ordering::Acquire);
        self.inner.register_snapshot(version);
        Box::new(KvSnapshot::new(Arc::clone(&self.inner), version))
    }

    fn crash(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::Release);
        // Drop the writer without syncing; whatever the OS already has of
        // the log is what recovery will see.
        *self.inner.wal.lock() = None;
        match fs::remove_file(self.inner.options.path.join(LOCK_FILE)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::Release);
        if let Some(mut writer) = self.inner.wal.lock().take() {
            if !self.inner.options.disable_data_sync {
                writer.sync()?;
            }
        }
        match fs::remove_file(self.inner.options.path.join(LOCK_FILE)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Delete the database directory.
///
/// Heap-profile droppings (`heap-` prefixed files) are removed first so a
/// partially failed removal never leaves them behind; a missing directory
/// is fine.
pub fn destroy_db(path: &Path) -> Result<()> {
    match fs::read_dir(path) {
        Ok(entries) => {
            for entry in entries {
                let entry = entry?;
                if entry.file_name().to_string_lossy().starts_with("heap-") {
                    fs::remove_file(entry.path())?;
                }
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    }
    fs::remove_dir_all(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open(dir: &Path) -> KvEngine {
        KvEngine::open(EngineOptions::for_path(dir)).unwrap()
    }

    fn wo() -> WriteOptions {
        WriteOptions::default()
    }

    fn ro() -> ReadOptions {
        ReadOptions::default()
    }

    #[test]
    fn put_get_delete() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());

        assert_eq!(db.get(&ro(), b"k").unwrap(), None);
        db.put(&wo(), b"k", b"v1").unwrap();
        assert_eq!(db.get(&ro(), b"k").unwrap(), Some(b"v1".to_vec()));
        db.put(&wo(), b"k", b"v2").unwrap();
        assert_eq!(db.get(&ro(), b"k").unwrap(), Some(b"v2".to_vec()));
        db.delete(&wo(), b"k").unwrap();
        assert_eq!(db.get(&ro(), b"k").unwrap(), None);
    }

    #[test]
    fn merge_behaves_as_put() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());

        db.merge(&wo(), b"k", b"first").unwrap();
        assert_eq!(db.get(&ro(), b"k").unwrap(), Some(b"first".to_vec()));
        db.merge(&wo(), b"k", b"second").unwrap();
        assert_eq!(db.get(&ro(), b"k").unwrap(), Some(b"second".to_vec()));
    }

    #[test]
    fn prefix_scan_is_ordered_and_bounded() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());

        db.put(&wo(), b"aa1", b"1").unwrap();
        db.put(&wo(), b"aa3", b"3").unwrap();
        db.put(&wo(), b"aa2", b"2").unwrap();
        db.put(&wo(), b"ab1", b"x").unwrap();
        db.put(&wo(), b"a", b"y").unwrap();

        let hits = db.scan_prefix(&ro(), b"aa").unwrap();
        let keys: Vec<_> = hits.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![&b"aa1"[..], b"aa2", b"aa3"]);
    }

    #[test]
    fn prefix_scan_at_0xff_boundary() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());

        db.put(&wo(), &[0xff, 0x00], b"a").unwrap();
        db.put(&wo(), &[0xff, 0xff], b"b").unwrap();
        db.put(&wo(), &[0xfe, 0x00], b"c").unwrap();

        let hits = db.scan_prefix(&ro(), &[0xff]).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn snapshot_is_a_point_in_time() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());

        db.put(&wo(), b"k", b"old").unwrap();
        let snap = db.snapshot();
        db.put(&wo(), b"k", b"new").unwrap();
        db.put(&wo(), b"fresh", b"x").unwrap();

        assert_eq!(snap.get(b"k").unwrap(), Some(b"old".to_vec()));
        assert_eq!(snap.get(b"fresh").unwrap(), None);
        assert_eq!(db.get(&ro(), b"k").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn batch_is_atomic_to_snapshots() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());

        let before = db.snapshot();
        let mut batch = WriteBatch::new();
        for i in 0..10u8 {
            batch.put(vec![b'k', i], vec![i]);
        }
        db.write(&wo(), batch).unwrap();
        let after = db.snapshot();

        for i in 0..10u8 {
            assert_eq!(before.get(&[b'k', i]).unwrap(), None);
            assert_eq!(after.get(&[b'k', i]).unwrap(), Some(vec![i]));
        }
    }

    #[test]
    fn crash_then_reopen_recovers_wal_writes() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());

        db.put(&wo(), b"durable", b"yes").unwrap();
        let mut batch = WriteBatch::new();
        batch.put(b"batched".to_vec(), b"also".to_vec());
        batch.delete(b"durable".to_vec());
        db.write(&wo(), batch).unwrap();
        db.crash().unwrap();
        drop(db);

        let db = open(dir.path());
        assert_eq!(db.get(&ro(), b"durable").unwrap(), None);
        assert_eq!(db.get(&ro(), b"batched").unwrap(), Some(b"also".to_vec()));
    }

    #[test]
    fn wal_disabled_writes_do_not_survive() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());

        let no_wal = WriteOptions {
            disable_wal: true,
            ..WriteOptions::default()
        };
        db.put(&no_wal, b"ephemeral", b"x").unwrap();
        assert_eq!(db.get(&ro(), b"ephemeral").unwrap(), Some(b"x".to_vec()));
        db.crash().unwrap();
        drop(db);

        let db = open(dir.path());
        assert_eq!(db.get(&ro(), b"ephemeral").unwrap(), None);
    }

    #[test]
    fn lock_file_excludes_second_open() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());

        let second = KvEngine::open(EngineOptions::for_path(dir.path()));
        assert!(matches!(second, Err(SiegeError::LockHeld(_))));

        db.crash().unwrap();
        drop(db);
        assert!(KvEngine::open(EngineOptions::for_path(dir.path())).is_ok());
    }

    #[test]
    fn operations_after_crash_are_rejected() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());
        db.crash().unwrap();

        assert!(db.get(&ro(), b"k").is_err());
        assert!(db.put(&wo(), b"k", b"v").is_err());
    }

    #[test]
    fn ttl_zero_expires_immediately() {
        let dir = tempdir().unwrap();
        let db = KvEngine::open(EngineOptions {
            ttl: Some(std::time::Duration::ZERO),
            ..EngineOptions::for_path(dir.path())
        })
        .unwrap();

        db.put(&wo(), b"k", b"v").unwrap();
        assert_eq!(db.get(&ro(), b"k").unwrap(), None);
        assert!(db.scan_prefix(&ro(), b"k").unwrap().is_empty());
    }

    #[test]
    fn ttl_long_keeps_entries_visible() {
        let dir = tempdir().unwrap();
        let db = KvEngine::open(EngineOptions {
            ttl: Some(std::time::Duration::from_secs(3600)),
            ..EngineOptions::for_path(dir.path())
        })
        .unwrap();

        db.put(&wo(), b"k", b"v").unwrap();
        assert_eq!(db.get(&ro(), b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn filter_deletes_skips_absent_keys() {
        let dir = tempdir().unwrap();
        let db = KvEngine::open(EngineOptions {
            filter_deletes: true,
            ..EngineOptions::for_path(dir.path())
        })
        .unwrap();

        db.put(&wo(), b"present", b"v").unwrap();
        db.delete(&wo(), b"present").unwrap();
        db.delete(&wo(), b"absent").unwrap();
        db.close().unwrap();
        drop(db);

        // Only the put and the real delete reached the log.
        let records = wal::replay(dir.path()).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn purge_on_reopen_compacts_the_wal() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());
        for i in 0..20u8 {
            db.put(&wo(), b"hot", &[i]).unwrap();
        }
        db.put(&wo(), b"gone", b"x").unwrap();
        db.delete(&wo(), b"gone").unwrap();
        db.close().unwrap();
        drop(db);

        let db = KvEngine::open(EngineOptions {
            purge_redundant_on_reopen: Some(true),
            ..EngineOptions::for_path(dir.path())
        })
        .unwrap();
        assert_eq!(db.get(&ro(), b"hot").unwrap(), Some(vec![19]));
        assert_eq!(db.get(&ro(), b"gone").unwrap(), None);
        db.close().unwrap();
        drop(db);

        let records = wal::replay(dir.path()).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn destroy_removes_heap_files_and_directory() {
        let dir = tempdir().unwrap();
        let db_dir = dir.path().join("db");
        fs::create_dir_all(&db_dir).unwrap();
        fs::write(db_dir.join("heap-0001"), b"profile").unwrap();
        fs::write(db_dir.join("wal.log"), b"").unwrap();

        destroy_db(&db_dir).unwrap();
        assert!(!db_dir.exists());

        // Destroying a missing directory is fine.
        destroy_db(&db_dir).unwrap();
    }
}
