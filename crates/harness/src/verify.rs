//! Post-workload verification.
//!
//! Each worker re-reads its stride of the key space and compares the
//! database against the shadow model. Any mismatch is fatal: the first
//! one is recorded in shared state and surfaces as the run's error.

use siege_core::{encode_key, generate_value, Result, SiegeError, StressConfig, SENTINEL};
use siege_engine::{ReadOptions, StorageEngine};

use crate::db::StressDb;
use crate::shadow::ShadowTable;
use crate::shared::SharedState;

/// Check one key against the shadow.
///
/// Two modes, selected by `strict`:
/// - `strict = false`: a SENTINEL entry means "don't check" and the key
///   is skipped without touching the database.
/// - `strict = true`: a SENTINEL entry means "must be absent" and the
///   database is required to return not-found.
///
/// The loose mode exists for mid-run spot checks where a concurrent
/// delete may have landed between the shadow read and the database read;
/// end-of-run verification is always strict.
pub fn verify_value(
    shadow: &ShadowTable,
    config: &StressConfig,
    engine: &dyn StorageEngine,
    key: u64,
    strict: bool,
) -> Result<()> {
    let base = shadow.get(key);
    if base == SENTINEL && !strict {
        return Ok(());
    }

    let read_opts = ReadOptions {
        verify_checksum: config.verify_checksum,
    };
    let encoded = encode_key(key);

    match engine.get(&read_opts, &encoded) {
        Ok(Some(from_db)) => {
            if base == SENTINEL {
                return Err(SiegeError::verification(key, "unexpected value found"));
            }
            let expected = generate_value(base, config.value_size_mult);
            if from_db.len() != expected.len() {
                return Err(SiegeError::verification(
                    key,
                    format!(
                        "length of value read is not equal (got {}, want {})",
                        from_db.len(),
                        expected.len()
                    ),
                ));
            }
            if from_db != expected {
                return Err(SiegeError::verification(
                    key,
                    "contents of value read don't match",
                ));
            }
            Ok(())
        }
        Ok(None) => {
            if base != SENTINEL {
                return Err(SiegeError::verification(key, "value not found"));
            }
            Ok(())
        }
        Err(e) => Err(SiegeError::verification(key, format!("read failed: {}", e))),
    }
}

/// Verify the stride `tid, tid + threads, tid + 2*threads, ...`.
///
/// Runs strictly; the first mismatch is recorded and the stride stops.
/// Strides also stop early once any worker has recorded a failure, so
/// one divergence does not cost a full table walk per thread.
pub fn verify_stride(shared: &SharedState, db: &StressDb, tid: u32) {
    let Some(shadow) = shared.shadow() else {
        return;
    };
    let config = shared.config();
    let engine = db.engine();
    let step = u64::from(config.threads);

    let mut key = u64::from(tid);
    while key < config.max_key {
        if shared.failed() {
            return;
        }
        if let Err(err) = verify_value(shadow, config, engine.as_ref(), key, true) {
            shared.record_failure(err);
            return;
        }
        key += step;
    }
}
