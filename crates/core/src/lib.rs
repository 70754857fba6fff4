//! Core types for the siege stress harness.
//!
//! This crate holds everything the other crates agree on: the key codec
//! and value generator that define the on-disk shape of the workload, the
//! run configuration, and the unified error type.

pub mod codec;
pub mod config;
pub mod error;

pub use codec::{decode_key, encode_key, generate_value, value_len, SENTINEL};
pub use config::StressConfig;
pub use error::{Result, SiegeError};
