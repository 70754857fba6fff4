//! Clean-run scenarios: smoke, reopen alignment, startup validation.

use crate::common::base_config;
use siege::{SiegeError, StressConfig, StressRunner};
use tempfile::tempdir;

/// Even 25/25/25/25 mix, two threads, no reopens: the run verifies.
#[test]
fn even_mix_smoke_run() {
    let dir = tempdir().unwrap();
    let config = StressConfig {
        threads: 2,
        ops_per_thread: 100,
        max_key: 128,
        readpercent: 25,
        prefixpercent: 25,
        writepercent: 25,
        delpercent: 25,
        reopen: 0,
        seed: 1,
        ..base_config(dir.path())
    };

    let summary = StressRunner::new(config).unwrap().run().unwrap();
    assert!(summary.verified);
    assert_eq!(summary.reopens, 0);
    assert_eq!(summary.stats.done(), 200);
}

/// Four threads with three mid-run reopens: exactly three reopen events,
/// and verification still passes against writes from before them.
#[test]
fn reopens_land_exactly_and_data_survives() {
    let dir = tempdir().unwrap();
    let config = StressConfig {
        threads: 4,
        ops_per_thread: 1000,
        max_key: 4096,
        reopen: 3,
        ..base_config(dir.path())
    };

    let summary = StressRunner::new(config).unwrap().run().unwrap();
    assert_eq!(summary.reopens, 3);
    assert!(summary.verified);
    // 1000 workload ops plus one progress tick per vote boundary.
    assert_eq!(summary.stats.done(), 4 * (1000 + 3));
}

/// Percentages that don't sum to 100 abort before any work.
#[test]
fn bad_percentages_abort_startup() {
    let dir = tempdir().unwrap();
    let config = StressConfig {
        readpercent: 25,
        prefixpercent: 25,
        writepercent: 25,
        delpercent: 24,
        ..base_config(dir.path())
    };

    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("percents != 100"));
    assert!(matches!(
        StressRunner::new(config),
        Err(SiegeError::Config(_))
    ));
}

/// Disabling the WAL while asking for reopens is unrecoverable.
#[test]
fn disable_wal_with_reopen_aborts_startup() {
    let dir = tempdir().unwrap();
    let config = StressConfig {
        disable_wal: true,
        reopen: 1,
        ..base_config(dir.path())
    };

    assert!(matches!(
        StressRunner::new(config),
        Err(SiegeError::Config(_))
    ));
}

/// Back-to-back runs against the same directory work because the
/// previous run released the engine and the directory is destroyed.
#[test]
fn sequential_runs_share_a_directory() {
    let dir = tempdir().unwrap();
    let config = StressConfig {
        threads: 2,
        ops_per_thread: 100,
        max_key: 256,
        ..base_config(dir.path())
    };

    StressRunner::new(config.clone()).unwrap().run().unwrap();
    StressRunner::new(config).unwrap().run().unwrap();
}

/// A TTL comfortably longer than the run behaves like the plain engine.
#[test]
fn long_ttl_still_verifies() {
    let dir = tempdir().unwrap();
    let config = StressConfig {
        threads: 2,
        ops_per_thread: 200,
        max_key: 256,
        ttl: Some(86_400),
        ..base_config(dir.path())
    };

    let summary = StressRunner::new(config).unwrap().run().unwrap();
    assert!(summary.verified);
}

/// Merge-as-put produces the same observable state as plain puts.
#[test]
fn merge_put_mode_verifies() {
    let dir = tempdir().unwrap();
    let config = StressConfig {
        threads: 2,
        ops_per_thread: 300,
        max_key: 512,
        use_merge_put: true,
        reopen: 1,
        ..base_config(dir.path())
    };

    let summary = StressRunner::new(config).unwrap().run().unwrap();
    assert!(summary.verified);
    assert_eq!(summary.reopens, 1);
}
