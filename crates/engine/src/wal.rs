//! Write-ahead log.
//!
//! One append-only `wal.log` per database directory. Records are
//! self-delimiting with a length prefix and CRC32 checksum:
//!
//! ```text
//! [length: u32][format_version: u8][op_count: u32][ops...][crc32: u32]
//! ```
//!
//! - **length**: size of everything after it (version + ops + crc32)
//! - **crc32**: checksum over \[format_version\]\[op_count\]\[ops\]
//!
//! One record holds one atomic unit: a single put/merge/delete, or every
//! step of a write batch. Recovery replays records in order and never
//! applies a partial record, which is what makes batches atomic across a
//! crash.
//!
//! A crash may legally truncate the tail of the log, so replay stops
//! quietly at a torn final record. A checksum failure with further bytes
//! behind it is genuine corruption and fails the open.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use siege_core::{Result, SiegeError};

use crate::batch::BatchOp;

/// Current record format version.
const WAL_FORMAT_VERSION: u8 = 1;

/// Op tags inside a record.
const TAG_PUT: u8 = 0;
const TAG_MERGE: u8 = 1;
const TAG_DELETE: u8 = 2;

/// Path of the log inside a database directory.
pub fn wal_path(dir: &Path) -> PathBuf {
    dir.join("wal.log")
}

/// Encode one atomic unit into record bytes.
pub fn encode_record(ops: &[BatchOp]) -> Vec<u8> {
    let mut record = Vec::with_capacity(64);
    encode_record_into(&mut record, ops);
    record
}

/// Encode one atomic unit into `record`, reusing its capacity.
fn encode_record_into(record: &mut Vec<u8>, ops: &[BatchOp]) {
    let mut payload = Vec::with_capacity(64);
    payload.push(WAL_FORMAT_VERSION);
    payload.extend_from_slice(&(ops.len() as u32).to_le_bytes());
    for op in ops {
        match op {
            BatchOp::Put { key, value } => {
                payload.push(TAG_PUT);
                put_slice(&mut payload, key);
                put_slice(&mut payload, value);
            }
            BatchOp::Merge { key, value } => {
                payload.push(TAG_MERGE);
                put_slice(&mut payload, key);
                put_slice(&mut payload, value);
            }
            BatchOp::Delete { key } => {
                payload.push(TAG_DELETE);
                put_slice(&mut payload, key);
            }
        }
    }

    let crc = crc32fast::hash(&payload);
    let total_len = payload.len() + 4;
    record.clear();
    record.reserve(4 + total_len);
    record.extend_from_slice(&(total_len as u32).to_le_bytes());
    record.extend_from_slice(&payload);
    record.extend_from_slice(&crc.to_le_bytes());
}

fn put_slice(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn get_slice<'a>(bytes: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    let len_end = pos.checked_add(4)?;
    let len = u32::from_le_bytes(bytes.get(*pos..len_end)?.try_into().ok()?) as usize;
    let end = len_end.checked_add(len)?;
    let slice = bytes.get(len_end..end)?;
    *pos = end;
    Some(slice)
}

/// Outcome of parsing one record out of a byte stream.
enum Parsed {
    /// A whole, checksummed record: its ops and the bytes consumed.
    Record(Vec<BatchOp>, usize),
    /// The stream ends mid-record (legal crash artifact).
    Torn,
    /// The record is complete but fails its checksum.
    BadChecksum { consumed: usize },
}

fn parse_record(bytes: &[u8]) -> Result<Parsed> {
    if bytes.len() < 4 {
        return Ok(Parsed::Torn);
    }
    let length = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    if length < 5 {
        return Err(SiegeError::corruption("wal record with impossible length"));
    }
    if bytes.len() < 4 + length {
        return Ok(Parsed::Torn);
    }

    let payload = &bytes[4..4 + length - 4];
    let stored_crc = u32::from_le_bytes(bytes[4 + length - 4..4 + length].try_into().unwrap());
    if crc32fast::hash(payload) != stored_crc {
        return Ok(Parsed::BadChecksum {
            consumed: 4 + length,
        });
    }

    if payload[0] != WAL_FORMAT_VERSION {
        return Err(SiegeError::corruption(format!(
            "unsupported wal format version {}",
            payload[0]
        )));
    }

    let op_count = u32::from_le_bytes(
        payload
            .get(1..5)
            .ok_or_else(|| SiegeError::corruption("wal record too short for op count"))?
            .try_into()
            .unwrap(),
    ) as usize;

    let mut pos = 5;
    let mut ops = Vec::with_capacity(op_count);
    for _ in 0..op_count {
        let tag = *payload
            .get(pos)
            .ok_or_else(|| SiegeError::corruption("wal record truncated inside op"))?;
        pos += 1;
        fn truncated() -> SiegeError {
            SiegeError::corruption("wal record truncated inside op")
        }
        match tag {
            TAG_PUT | TAG_MERGE => {
                let key = get_slice(payload, &mut pos).ok_or_else(truncated)?.to_vec();
                let value = get_slice(payload, &mut pos).ok_or_else(truncated)?.to_vec();
                ops.push(if tag == TAG_PUT {
                    BatchOp::Put { key, value }
                } else {
                    BatchOp::Merge { key, value }
                });
            }
            TAG_DELETE => {
                let key = get_slice(payload, &mut pos).ok_or_else(truncated)?.to_vec();
                ops.push(BatchOp::Delete { key });
            }
            other => {
                return Err(SiegeError::corruption(format!("unknown wal op tag {}", other)));
            }
        }
    }

    Ok(Parsed::Record(ops, 4 + length))
}

/// Replay every intact record in `dir`'s log, in write order.
///
/// Missing log file means an empty history. A torn or checksum-failed
/// final record ends replay; a checksum failure followed by more data is
/// corruption.
pub fn replay(dir: &Path) -> Result<Vec<Vec<BatchOp>>> {
    let path = wal_path(dir);
    let mut bytes = Vec::new();
    match File::open(&path) {
        Ok(mut file) => {
            file.read_to_end(&mut bytes)?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    }

    let mut records = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        match parse_record(&bytes[pos..])? {
            Parsed::Record(ops, consumed) => {
                records.push(ops);
                pos += consumed;
            }
            Parsed::Torn => {
                tracing::warn!(
                    offset = pos,
                    "torn record at wal tail, dropping {} trailing bytes",
                    bytes.len() - pos
                );
                break;
            }
            Parsed::BadChecksum { consumed } => {
                if pos + consumed >= bytes.len() {
                    tracing::warn!(offset = pos, "checksum failure at wal tail, dropping record");
                    break;
                }
                return Err(SiegeError::corruption(format!(
                    "wal checksum mismatch at offset {}",
                    pos
                )));
            }
        }
    }
    Ok(records)
}

/// Appender for the active log.
pub struct WalWriter {
    file: File,
    use_fsync: bool,
    /// Reusable encode buffer, pre-sized from the write buffer budget.
    buf: Vec<u8>,
}

impl WalWriter {
    /// Open (or create) the log in `dir` for appending.
    pub fn open(dir: &Path, use_fsync: bool, buffer_budget: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(wal_path(dir))?;
        Ok(Self {
            file,
            use_fsync,
            buf: Vec::with_capacity(buffer_budget.min(1 << 20)),
        })
    }

    /// Append one atomic unit. With `sync`, the record reaches disk
    /// before this returns.
    pub fn append(&mut self, ops: &[BatchOp], sync: bool) -> Result<()> {
        encode_record_into(&mut self.buf, ops);
        self.file.write_all(&self.buf)?;
        if sync {
            self.sync()?;
        }
        Ok(())
    }

    /// Force the log to disk.
    pub fn sync(&mut self) -> Result<()> {
        if self.use_fsync {
            self.file.sync_all()?;
        } else {
            self.file.sync_data()?;
        }
        Ok(())
    }
}

/// Atomically replace the log with one put record per live entry.
///
/// Used on reopen to drop redundant history (overwritten versions,
/// deleted keys) from the log.
pub fn rewrite<'a>(
    dir: &Path,
    live: impl Iterator<Item = (&'a [u8], &'a [u8])>,
) -> Result<()> {
    let tmp = dir.join("wal.log.tmp");
    {
        let mut file = File::create(&tmp)?;
        for (key, value) in live {
            let op = BatchOp::Put {
                key: key.to_vec(),
                value: value.to_vec(),
            };
            file.write_all(&encode_record(std::slice::from_ref(&op)))?;
        }
        file.sync_all()?;
    }
    std::fs::rename(&tmp, wal_path(dir))?;
    Ok(())
}
