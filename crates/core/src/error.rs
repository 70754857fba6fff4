//! Error types for the siege harness.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait
//! implementations. `SiegeError` is the unified error type across all
//! crates.
//!
//! ## Error Classification
//!
//! - **Per-operation errors** (`Engine`): a database call returned a
//!   non-OK, non-NotFound status. These are counted in the worker's stats
//!   and the run continues, so one run can surface as many symptoms as
//!   possible.
//! - **Fatal errors** (`Config`, `Io`, `Corruption`, `LockHeld`,
//!   `Verification`): invalid configuration, failure to open the
//!   database, or divergence between the shadow model and the database.
//!   These stop the run; the CLI maps them to exit code 1.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the siege crates.
pub type Result<T> = std::result::Result<T, SiegeError>;

/// Unified error type for all siege APIs.
#[derive(Debug, Error)]
pub enum SiegeError {
    /// Invalid run configuration, detected before any work begins.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Filesystem failure (database directory, WAL, lock file).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// On-disk state failed an integrity check (bad magic, CRC mismatch).
    #[error("corruption: {0}")]
    Corruption(String),

    /// The engine returned a non-OK, non-NotFound status.
    #[error("engine error: {0}")]
    Engine(String),

    /// Another live process holds the database lock file.
    #[error("database is locked: {0}")]
    LockHeld(PathBuf),

    /// The database's observable state diverged from the shadow model.
    ///
    /// This is the fatal class: it names the first divergent key and the
    /// nature of the mismatch.
    #[error("verification failed for key {key}: {reason}")]
    Verification { key: u64, reason: String },
}

impl SiegeError {
    /// Invalid-configuration error from anything displayable.
    pub fn config(msg: impl Into<String>) -> Self {
        SiegeError::Config(msg.into())
    }

    /// Corruption error from anything displayable.
    pub fn corruption(msg: impl Into<String>) -> Self {
        SiegeError::Corruption(msg.into())
    }

    /// Engine-status error from anything displayable.
    pub fn engine(msg: impl Into<String>) -> Self {
        SiegeError::Engine(msg.into())
    }

    /// Verification failure for a specific logical key.
    pub fn verification(key: u64, reason: impl Into<String>) -> Self {
        SiegeError::Verification {
            key,
            reason: reason.into(),
        }
    }

    /// True for errors that must stop the run.
    ///
    /// `Engine` errors are contained inside the worker that observed them
    /// (counted, then the workload continues); everything else terminates.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SiegeError::Engine(_))
    }
}
