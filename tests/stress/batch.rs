//! Batch/snapshot mode against the honest engine.

use crate::common::base_config;
use siege::{StressConfig, StressRunner};
use tempfile::tempdir;

/// Batch mode runs clean: every snapshot sees whole batches, every lane
/// agrees, and no shadow table exists to verify at the end.
#[test]
fn batch_mode_smoke_run() {
    let dir = tempdir().unwrap();
    let config = StressConfig {
        threads: 4,
        ops_per_thread: 400,
        max_key: 64,
        readpercent: 30,
        prefixpercent: 10,
        writepercent: 40,
        delpercent: 20,
        test_batches_snapshots: true,
        ..base_config(dir.path())
    };

    let summary = StressRunner::new(config).unwrap().run().unwrap();
    assert!(!summary.verified);
    assert_eq!(summary.stats.cross_lane_errors(), 0);
    assert_eq!(summary.stats.errors(), 0);
}

/// Batch mode with mid-run reopens: recovered batches are still whole.
#[test]
fn batch_mode_survives_reopens() {
    let dir = tempdir().unwrap();
    let config = StressConfig {
        threads: 2,
        ops_per_thread: 500,
        max_key: 64,
        readpercent: 30,
        prefixpercent: 10,
        writepercent: 40,
        delpercent: 20,
        test_batches_snapshots: true,
        reopen: 4,
        ..base_config(dir.path())
    };

    let summary = StressRunner::new(config).unwrap().run().unwrap();
    assert_eq!(summary.reopens, 4);
    assert_eq!(summary.stats.cross_lane_errors(), 0);
}
