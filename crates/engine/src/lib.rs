//! Storage-engine abstraction and reference engine for siege.
//!
//! The harness drives any implementation of [`StorageEngine`]; the
//! [`KvEngine`] here is an ordered, versioned, WAL-backed in-process
//! engine that honestly implements the full adapter surface, including
//! crash-style teardown and recovery. Tests inject misbehaving engines
//! through the same trait to prove the harness catches divergence.

pub mod batch;
pub mod options;
pub mod snapshot;
pub mod store;
pub mod traits;
pub mod wal;

pub use batch::{BatchOp, WriteBatch};
pub use options::{EngineOptions, ReadOptions, WriteOptions};
pub use snapshot::KvSnapshot;
pub use store::{destroy_db, KvEngine};
pub use traits::{EngineSnapshot, StorageEngine};
