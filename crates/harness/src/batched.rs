//! Batch/snapshot mode: ten-lane operations.
//!
//! Instead of mirroring writes into a shadow table, this mode fans every
//! logical key across ten lane prefixes `"0"..="9"` and cross-checks the
//! lanes against each other:
//!
//! - a MultiPut writes all ten lanes in one atomic batch, so any snapshot
//!   must see the lanes move together (write-batch atomicity);
//! - a MultiGet reads all ten lanes under one snapshot, so the bodies it
//!   sees must agree (snapshot isolation).
//!
//! Lane values carry their lane digit in the first byte; checks blank
//! that byte and require the remaining bodies to be identical across
//! lanes. Inconsistencies are logged and counted, and the run continues
//! so one run can surface as many symptoms as possible.

use siege_engine::{WriteBatch, WriteOptions};

use crate::driver::Worker;

/// Lane digits in MultiPut application order.
const PUT_LANES: [u8; 10] = [b'9', b'8', b'7', b'6', b'5', b'4', b'3', b'2', b'1', b'0'];

/// Lane digits in MultiDelete application order.
const DELETE_LANES: [u8; 10] = [b'9', b'7', b'5', b'3', b'1', b'8', b'6', b'4', b'2', b'0'];

fn lane(digit: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(digit);
    out.extend_from_slice(body);
    out
}

impl Worker {
    /// Put `("0"+K, "0"+V) ... ("9"+K, "9"+V)` in one atomic batch.
    pub(crate) fn multi_put(&mut self, write_opts: &WriteOptions, key: &[u8], value: &[u8]) {
        let use_merge = self.shared.config().use_merge_put;
        let mut batch = WriteBatch::new();
        for digit in PUT_LANES {
            if use_merge {
                batch.merge(lane(digit, key), lane(digit, value));
            } else {
                batch.put(lane(digit, key), lane(digit, value));
            }
        }

        match self.db.engine().write(write_opts, batch) {
            Ok(()) => {
                // Ten writes of size |V| + 1 each.
                self.stats
                    .add_bytes_for_writes(10, (value.len() as u64 + 1) * 10);
            }
            Err(e) => {
                tracing::error!(error = %e, "multiput error");
                self.stats.add_errors(1);
            }
        }
    }

    /// Delete all ten lane keys of `K` in one atomic batch.
    pub(crate) fn multi_delete(&mut self, write_opts: &WriteOptions, key: &[u8]) {
        let mut batch = WriteBatch::new();
        for digit in DELETE_LANES {
            batch.delete(lane(digit, key));
        }

        match self.db.engine().write(write_opts, batch) {
            Ok(()) => self.stats.add_deletes(10),
            Err(e) => {
                tracing::error!(error = %e, "multidelete error");
                self.stats.add_errors(1);
            }
        }
    }

    /// Read all ten lanes of `K` under one snapshot and cross-check them.
    ///
    /// Assumes lanes were written by `multi_put`: each found value must
    /// lead with its lane digit, and after blanking that digit all found
    /// bodies must be byte-equal. Lanes that are uniformly absent are
    /// fine; a mix of absent and present lanes is an atomicity violation.
    pub(crate) fn multi_get(&mut self, key: &[u8]) {
        let engine = self.db.engine();
        let snapshot = engine.snapshot();

        let mut values: Vec<Option<Vec<u8>>> = Vec::with_capacity(10);
        for digit in b'0'..=b'9' {
            let lane_key = lane(digit, key);
            match snapshot.get(&lane_key) {
                Ok(Some(mut value)) => {
                    if value.first() != Some(&digit) {
                        tracing::error!(
                            expected = %(digit as char),
                            actual = %value.first().map(|b| *b as char).unwrap_or('?'),
                            "lane digit mismatch"
                        );
                        self.stats.add_cross_lane_errors(1);
                    }
                    if let Some(first) = value.first_mut() {
                        *first = b' ';
                    }
                    self.stats.add_gets(1, 1);
                    values.push(Some(value));
                }
                Ok(None) => {
                    self.stats.add_gets(1, 0);
                    values.push(None);
                }
                Err(e) => {
                    tracing::error!(error = %e, "get error");
                    self.stats.add_errors(1);
                    values.push(None);
                }
            }
        }
        drop(snapshot);

        for i in 1..values.len() {
            if values[i] != values[0] {
                tracing::error!(
                    key = ?key,
                    lane = i,
                    "inconsistent values across lanes"
                );
                self.stats.add_cross_lane_errors(1);
            }
        }
    }

    /// Scan all ten lane prefixes of `P` under one snapshot, in lockstep.
    ///
    /// Every lane must return the same number of entries, and at each
    /// position the blanked bodies must agree across lanes.
    pub(crate) fn multi_prefix_scan(&mut self, prefix: &[u8]) {
        let engine = self.db.engine();
        let snapshot = engine.snapshot();

        let mut lanes: Vec<Vec<(Vec<u8>, Vec<u8>)>> = Vec::with_capacity(10);
        for digit in b'0'..=b'9' {
            match snapshot.scan_prefix(&lane(digit, prefix)) {
                Ok(hits) => lanes.push(hits),
                Err(e) => {
                    tracing::error!(error = %e, "prefix scan error");
                    self.stats.add_errors(1);
                    return;
                }
            }
        }
        drop(snapshot);

        let count = lanes[0].len();
        let mut aligned = true;
        for (i, hits) in lanes.iter().enumerate() {
            if hits.len() != count {
                tracing::error!(
                    prefix = ?prefix,
                    lane = i,
                    got = hits.len(),
                    want = count,
                    "lane scans returned different counts"
                );
                self.stats.add_cross_lane_errors(1);
                aligned = false;
            }
        }

        if aligned {
            for step in 0..count {
                let mut first_body: Option<Vec<u8>> = None;
                for (i, hits) in lanes.iter().enumerate() {
                    let digit = b'0' + i as u8;
                    let mut value = hits[step].1.clone();
                    if value.first() != Some(&digit) {
                        tracing::error!(
                            expected = %(digit as char),
                            actual = %value.first().map(|b| *b as char).unwrap_or('?'),
                            "lane digit mismatch in scan"
                        );
                        self.stats.add_cross_lane_errors(1);
                    }
                    if let Some(first) = value.first_mut() {
                        *first = b' ';
                    }
                    match &first_body {
                        None => first_body = Some(value),
                        Some(reference) => {
                            if &value != reference {
                                tracing::error!(
                                    prefix = ?prefix,
                                    lane = i,
                                    step,
                                    "inconsistent values across lane scans"
                                );
                                self.stats.add_cross_lane_errors(1);
                            }
                        }
                    }
                }
            }
        }

        self.stats.add_prefixes(1, count as u64);
    }
}
