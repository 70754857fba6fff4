//! Shared utilities for the end-to-end stress suites.
//!
//! Besides config builders, this module hosts the misbehaving engines:
//! wrappers around the reference engine that violate exactly one
//! guarantee each, so the suites can prove the harness catches the
//! violation through the public seam alone.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use siege::{
    EngineOptions, EngineSnapshot, KvEngine, ReadOptions, StorageEngine, StressConfig, WriteBatch,
    WriteOptions,
};
use siege_engine::BatchOp;
use siege_harness::StressDb;

/// A small, quick configuration rooted in `dir`.
pub fn base_config(dir: &Path) -> StressConfig {
    StressConfig {
        threads: 2,
        max_key: 1024,
        ops_per_thread: 500,
        reopen: 0,
        db_path: dir.join("db"),
        ..StressConfig::default()
    }
}

/// A [`StressDb`] whose opener wraps each freshly opened reference
/// engine with `wrap`.
pub fn db_with_wrapper<F>(dir: &Path, wrap: F) -> StressDb
where
    F: Fn(KvEngine) -> Arc<dyn StorageEngine> + Send + Sync + 'static,
{
    let path = dir.join("db");
    StressDb::with_opener(Box::new(move || {
        let inner = KvEngine::open(EngineOptions::for_path(path.clone()))?;
        Ok(wrap(inner))
    }))
    .unwrap()
}

// ============================================================================
// Write-dropping engine (shadow divergence)
// ============================================================================

/// Acknowledges every N-th put without performing it.
pub struct DroppingEngine {
    inner: KvEngine,
    puts: AtomicU64,
    drop_every: u64,
}

impl DroppingEngine {
    pub fn new(inner: KvEngine, drop_every: u64) -> Self {
        Self {
            inner,
            puts: AtomicU64::new(0),
            drop_every,
        }
    }
}

impl StorageEngine for DroppingEngine {
    fn get(&self, opts: &ReadOptions, key: &[u8]) -> siege::Result<Option<Vec<u8>>> {
        self.inner.get(opts, key)
    }

    fn put(&self, opts: &WriteOptions, key: &[u8], value: &[u8]) -> siege::Result<()> {
        let n = self.puts.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.drop_every == 0 {
            // Lie: report success, write nothing.
            return Ok(());
        }
        self.inner.put(opts, key, value)
    }

    fn merge(&self, opts: &WriteOptions, key: &[u8], value: &[u8]) -> siege::Result<()> {
        self.inner.merge(opts, key, value)
    }

    fn delete(&self, opts: &WriteOptions, key: &[u8]) -> siege::Result<()> {
        self.inner.delete(opts, key)
    }

    fn write(&self, opts: &WriteOptions, batch: WriteBatch) -> siege::Result<()> {
        self.inner.write(opts, batch)
    }

    fn scan_prefix(
        &self,
        opts: &ReadOptions,
        prefix: &[u8],
    ) -> siege::Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.scan_prefix(opts, prefix)
    }

    fn snapshot(&self) -> Box<dyn EngineSnapshot> {
        self.inner.snapshot()
    }

    fn crash(&self) -> siege::Result<()> {
        self.inner.crash()
    }

    fn close(&self) -> siege::Result<()> {
        self.inner.close()
    }
}

// ============================================================================
// Non-atomic batch engine (atomicity violation)
// ============================================================================

/// Applies all but the last step of every write batch, one by one.
pub struct NonAtomicEngine {
    inner: KvEngine,
}

impl NonAtomicEngine {
    pub fn new(inner: KvEngine) -> Self {
        Self { inner }
    }
}

impl StorageEngine for NonAtomicEngine {
    fn get(&self, opts: &ReadOptions, key: &[u8]) -> siege::Result<Option<Vec<u8>>> {
        self.inner.get(opts, key)
    }

    fn put(&self, opts: &WriteOptions, key: &[u8], value: &[u8]) -> siege::Result<()> {
        self.inner.put(opts, key, value)
    }

    fn merge(&self, opts: &WriteOptions, key: &[u8], value: &[u8]) -> siege::Result<()> {
        self.inner.merge(opts, key, value)
    }

    fn delete(&self, opts: &WriteOptions, key: &[u8]) -> siege::Result<()> {
        self.inner.delete(opts, key)
    }

    fn write(&self, opts: &WriteOptions, batch: WriteBatch) -> siege::Result<()> {
        let mut ops = batch.into_ops();
        ops.pop();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => self.inner.put(opts, &key, &value)?,
                BatchOp::Merge { key, value } => self.inner.merge(opts, &key, &value)?,
                BatchOp::Delete { key } => self.inner.delete(opts, &key)?,
            }
        }
        Ok(())
    }

    fn scan_prefix(
        &self,
        opts: &ReadOptions,
        prefix: &[u8],
    ) -> siege::Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.scan_prefix(opts, prefix)
    }

    fn snapshot(&self) -> Box<dyn EngineSnapshot> {
        self.inner.snapshot()
    }

    fn crash(&self) -> siege::Result<()> {
        self.inner.crash()
    }

    fn close(&self) -> siege::Result<()> {
        self.inner.close()
    }
}
