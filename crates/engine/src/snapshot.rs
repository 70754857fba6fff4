//! Point-in-time views over the reference engine.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use siege_core::Result;

use crate::store::EngineInner;
use crate::traits::EngineSnapshot;

/// Snapshot of a [`KvEngine`](crate::KvEngine) at a captured version.
///
/// Acquisition is an atomic load plus a registry bump; the snapshot holds
/// the engine internals alive and pins its version against garbage
/// collection until dropped. Point reads are cached so repeated lookups
/// of the same key stay cheap under the ten-lane cross-checks.
pub struct KvSnapshot {
    inner: Arc<EngineInner>,
    version: u64,
    cache: RwLock<FxHashMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl KvSnapshot {
    pub(crate) fn new(inner: Arc<EngineInner>, version: u64) -> Self {
        Self {
            inner,
            version,
            cache: RwLock::new(FxHashMap::default()),
        }
    }

    /// The version this snapshot reads at.
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl EngineSnapshot for KvSnapshot {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        {
            let cache = self.cache.read();
            if let Some(hit) = cache.get(key) {
                return Ok(hit.clone());
            }
        }

        let value = self.inner.read_at(key, self.version);
        self.cache.write().insert(key.to_vec(), value.clone());
        Ok(value)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self.inner.scan_at(prefix, self.version))
    }
}

impl Drop for KvSnapshot {
    fn drop(&mut self) {
        self.inner.release_snapshot(self.version);
    }
}
