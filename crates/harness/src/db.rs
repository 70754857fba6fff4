//! The reopenable database handle.
//!
//! Workers never hold the engine directly: they clone the current
//! `Arc<dyn StorageEngine>` out of a slot for each operation. A reopen
//! crashes the live engine (discarding its memory state without a flush,
//! exactly like a kill) and installs a freshly opened one in the slot.
//! The shadow model is deliberately not touched by a reopen: agreeing
//! with pre-reopen shadow entries afterwards is the durability property
//! under test.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use siege_core::{Result, StressConfig};
use siege_engine::{EngineOptions, KvEngine, StorageEngine};

/// Factory producing a freshly opened engine from the run's options.
pub type EngineOpener = Box<dyn Fn() -> Result<Arc<dyn StorageEngine>> + Send + Sync>;

/// Engine slot shared by all workers, swapped on reopen.
pub struct StressDb {
    engine: RwLock<Arc<dyn StorageEngine>>,
    opener: EngineOpener,
    reopens: AtomicU32,
}

impl StressDb {
    /// Open the initial engine through `opener` and keep the factory for
    /// reopens. Tests use this to inject misbehaving engines.
    pub fn with_opener(opener: EngineOpener) -> Result<Self> {
        let engine = opener()?;
        Ok(Self {
            engine: RwLock::new(engine),
            opener,
            reopens: AtomicU32::new(0),
        })
    }

    /// Open the reference engine with options derived from `config`.
    pub fn open(config: &StressConfig) -> Result<Self> {
        let options = engine_options(config);
        Self::with_opener(Box::new(move || {
            let engine = KvEngine::open(options.clone())?;
            Ok(Arc::new(engine) as Arc<dyn StorageEngine>)
        }))
    }

    /// The live engine. Cheap: a read lock and an `Arc` bump.
    pub fn engine(&self) -> Arc<dyn StorageEngine> {
        Arc::clone(&self.engine.read())
    }

    /// Crash the live engine and open a fresh one from persistent state.
    ///
    /// Callers must guarantee no other worker is mid-operation; the
    /// harness does so by parking every other thread on the reopen
    /// condvar first.
    pub fn reopen(&self) -> Result<()> {
        let mut slot = self.engine.write();
        slot.crash()?;
        *slot = (self.opener)()?;
        let n = self.reopens.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::info!(count = n, "reopening database");
        Ok(())
    }

    /// Gracefully close the live engine.
    pub fn close(&self) -> Result<()> {
        self.engine.read().close()
    }

    /// How many reopens have happened.
    pub fn reopens(&self) -> u32 {
        self.reopens.load(Ordering::Acquire)
    }
}

/// Map the run configuration onto engine options.
fn engine_options(config: &StressConfig) -> EngineOptions {
    EngineOptions {
        path: config.db_path.clone(),
        create_if_missing: true,
        ttl: config.ttl.map(Duration::from_secs),
        kill_odds: config.kill_random_test,
        write_buffer_size: config.write_buffer_size,
        purge_redundant_on_reopen: None,
        purge_redundant_percent: config.purge_redundant_percent,
        use_fsync: config.use_fsync,
        disable_data_sync: config.disable_data_sync,
        filter_deletes: config.filter_deletes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siege_core::SiegeError;
    use siege_engine::{ReadOptions, WriteOptions};
    use tempfile::tempdir;

    fn config_at(dir: &std::path::Path) -> StressConfig {
        StressConfig {
            db_path: dir.to_path_buf(),
            threads: 1,
            max_key: 16,
            ops_per_thread: 10,
            reopen: 0,
            ..StressConfig::default()
        }
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempdir().unwrap();
        let db = StressDb::open(&config_at(dir.path())).unwrap();

        db.engine()
            .put(&WriteOptions::default(), b"k", b"v")
            .unwrap();
        db.reopen().unwrap();
        assert_eq!(db.reopens(), 1);

        let value = db.engine().get(&ReadOptions::default(), b"k").unwrap();
        assert_eq!(value, Some(b"v".to_vec()));
    }

    #[test]
    fn reopen_counts_accumulate() {
        let dir = tempdir().unwrap();
        let db = StressDb::open(&config_at(dir.path())).unwrap();
        for _ in 0..3 {
            db.reopen().unwrap();
        }
        assert_eq!(db.reopens(), 3);
    }

    #[test]
    fn opener_failures_propagate() {
        let db = StressDb::with_opener(Box::new(|| {
            Err(SiegeError::engine("refusing to open"))
        }));
        assert!(db.is_err());
    }
}
