//! # Siege
//!
//! A concurrent stress-and-verification harness for ordered key-value
//! storage engines.
//!
//! Siege drives a live engine with a randomized workload mixing point
//! reads, prefix scans, point writes, and point deletes across many
//! threads, periodically simulates crash-recovery by reopening the engine
//! mid-run, and at the end proves that the engine's observable state
//! agrees with an in-memory shadow model.
//!
//! # Quick Start
//!
//! ```no_run
//! use siege::{StressConfig, StressRunner};
//!
//! fn main() -> siege::Result<()> {
//!     let config = StressConfig {
//!         threads: 4,
//!         max_key: 4096,
//!         ops_per_thread: 10_000,
//!         reopen: 3,
//!         db_path: "./siege-data".into(),
//!         ..StressConfig::default()
//!     };
//!     config.validate()?;
//!
//!     let summary = StressRunner::new(config)?.run()?;
//!     println!("reopened {} times, verified: {}", summary.reopens, summary.verified);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! | Crate | Responsibility |
//! |-------|----------------|
//! | `siege-core` | Key codec, value generator, configuration, errors |
//! | `siege-engine` | The [`StorageEngine`] adapter trait and a WAL-backed reference engine |
//! | `siege-harness` | Shadow model, workload driver, phase barriers, verifier |
//! | `siege-cli` | The `siege` binary |
//!
//! The harness is generic over [`StorageEngine`]; tests inject misbehaving
//! engines through the same seam to prove the verifier catches divergence.

pub use siege_core::{
    decode_key, encode_key, generate_value, Result, SiegeError, StressConfig, SENTINEL,
};
pub use siege_engine::{
    destroy_db, EngineOptions, EngineSnapshot, KvEngine, ReadOptions, StorageEngine, WriteBatch,
    WriteOptions,
};
pub use siege_harness::{RunSummary, Stats, StressDb, StressRunner};
