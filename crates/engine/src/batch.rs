//! Atomic write batches.
//!
//! A batch is an ordered list of put/merge/delete steps applied as one
//! unit: a snapshot taken outside the batch sees either all of its steps
//! or none of them, and a crash either recovers the whole batch or drops
//! it entirely.

/// One step of a write batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Set `key` to `value`.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Merge `value` into `key`. The reference engine's merge operator
    /// behaves as a put.
    Merge { key: Vec<u8>, value: Vec<u8> },
    /// Remove `key`.
    Delete { key: Vec<u8> },
}

/// An ordered collection of steps applied atomically via
/// [`StorageEngine::write`](crate::StorageEngine::write).
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a put step.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Append a merge step.
    pub fn merge(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Merge {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Append a delete step.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete { key: key.into() });
    }

    /// Number of steps in the batch.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True if the batch has no steps.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The steps, in application order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Consume the batch, yielding its steps.
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}
