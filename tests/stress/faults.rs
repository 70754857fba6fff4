//! Misbehaving-engine scenarios: the harness must notice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::common::{base_config, db_with_wrapper, DroppingEngine, NonAtomicEngine};
use siege::{EngineOptions, KvEngine, SiegeError, StorageEngine, StressConfig, StressRunner};
use siege_harness::StressDb;
use tempfile::tempdir;

/// An engine that silently drops a fraction of its puts diverges from
/// the shadow; verification fails and names the divergent key.
#[test]
fn dropped_writes_fail_verification() {
    let dir = tempdir().unwrap();
    let config = StressConfig {
        threads: 2,
        ops_per_thread: 1000,
        // Large key universe: a dropped write is almost never repaired
        // by a later write or delete of the same key.
        max_key: 100_000,
        readpercent: 5,
        prefixpercent: 5,
        writepercent: 85,
        delpercent: 5,
        ..base_config(dir.path())
    };

    let db = db_with_wrapper(dir.path(), |inner| {
        Arc::new(DroppingEngine::new(inner, 10))
    });
    let err = StressRunner::with_db(config, Arc::new(db))
        .unwrap()
        .run()
        .unwrap_err();

    match err {
        SiegeError::Verification { key, reason } => {
            // A dropped put reads as missing, or as the stale previous
            // value when it was an overwrite.
            assert!(
                reason.contains("value not found") || reason.contains("don't match"),
                "reason: {}",
                reason
            );
            assert!(key < 100_000);
        }
        other => panic!("expected a verification failure, got: {}", other),
    }
}

/// With `verify_before_write`, a dropped put is caught the next time the
/// same key is written, and the run aborts with the divergence.
#[test]
fn verify_before_write_catches_divergence() {
    let dir = tempdir().unwrap();
    let config = StressConfig {
        threads: 2,
        ops_per_thread: 1000,
        // Tiny universe so dropped keys are re-written (and re-checked)
        // quickly.
        max_key: 64,
        readpercent: 5,
        prefixpercent: 5,
        writepercent: 85,
        delpercent: 5,
        verify_before_write: true,
        ..base_config(dir.path())
    };

    let db = db_with_wrapper(dir.path(), |inner| {
        Arc::new(DroppingEngine::new(inner, 5))
    });
    let err = StressRunner::with_db(config, Arc::new(db))
        .unwrap()
        .run()
        .unwrap_err();

    assert!(matches!(err, SiegeError::Verification { .. }), "{}", err);
}

/// A reopen that fails to bring the database back is fatal: no worker
/// runs another chunk, and the run surfaces the open error.
#[test]
fn failed_reopen_aborts_the_run() {
    let dir = tempdir().unwrap();
    let config = StressConfig {
        threads: 2,
        ops_per_thread: 400,
        max_key: 256,
        reopen: 1,
        ..base_config(dir.path())
    };

    let path = dir.path().join("db");
    let opens = AtomicU64::new(0);
    let db = StressDb::with_opener(Box::new(move || {
        if opens.fetch_add(1, Ordering::Relaxed) == 0 {
            let engine = KvEngine::open(EngineOptions::for_path(path.clone()))?;
            Ok(Arc::new(engine) as Arc<dyn StorageEngine>)
        } else {
            Err(SiegeError::corruption("simulated unrecoverable wal damage"))
        }
    }))
    .unwrap();

    let err = StressRunner::with_db(config, Arc::new(db))
        .unwrap()
        .run()
        .unwrap_err();
    assert!(matches!(err, SiegeError::Corruption(_)), "{}", err);
}

/// An engine whose batches apply nine of ten steps breaks lane
/// atomicity; batch mode observes cross-lane inconsistencies in-band.
#[test]
fn non_atomic_batches_are_reported_in_batch_mode() {
    let dir = tempdir().unwrap();
    let config = StressConfig {
        threads: 2,
        ops_per_thread: 500,
        // Tiny universe so gets collide with puts quickly.
        max_key: 16,
        readpercent: 45,
        prefixpercent: 5,
        writepercent: 45,
        delpercent: 5,
        test_batches_snapshots: true,
        ..base_config(dir.path())
    };

    let db = db_with_wrapper(dir.path(), |inner| Arc::new(NonAtomicEngine::new(inner)));
    let summary = StressRunner::with_db(config, Arc::new(db))
        .unwrap()
        .run()
        .unwrap();

    // Cross-lane inconsistencies are contained, not fatal.
    assert!(!summary.verified);
    assert!(
        summary.stats.cross_lane_errors() > 0,
        "expected at least one cross-lane inconsistency"
    );
}

/// The honest reference engine produces no cross-lane inconsistencies.
#[test]
fn honest_engine_is_lane_consistent() {
    let dir = tempdir().unwrap();
    let config = StressConfig {
        threads: 2,
        ops_per_thread: 500,
        max_key: 16,
        readpercent: 45,
        prefixpercent: 5,
        writepercent: 45,
        delpercent: 5,
        test_batches_snapshots: true,
        ..base_config(dir.path())
    };

    let summary = StressRunner::new(config).unwrap().run().unwrap();
    assert_eq!(summary.stats.cross_lane_errors(), 0);
}
