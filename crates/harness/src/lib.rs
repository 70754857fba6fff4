//! The siege stress harness.
//!
//! Drives a [`StorageEngine`](siege_engine::StorageEngine) with a
//! randomized workload across many threads while mirroring every write
//! into an in-memory shadow model, then proves the engine agrees with
//! the shadow. See [`StressRunner`] for the lifecycle.

pub mod batched;
pub mod db;
pub mod driver;
pub mod runner;
pub mod shadow;
pub mod shared;
pub mod stats;
pub mod verify;

pub use db::StressDb;
pub use runner::{RunSummary, StressRunner};
pub use shadow::{ShadowTable, ShardLocks};
pub use shared::SharedState;
pub use stats::Stats;
