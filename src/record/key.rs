//! Idempotent output identifiers.
//!
//! Two modes, never mixed within a single sink target: content-addressed
//! keys (a SHA-256 digest of the record's canonical bytes) for batched
//! targets, and run-scoped sequence keys (sortable timestamp plus a
//! monotonic counter) for split-mode targets where uniqueness within the
//! run, not content addressing, is the requirement.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::record::Record;

/// Joins field values before hashing. A control byte that never occurs in
/// feed data, so distinct field boundaries cannot collide.
const FIELD_SEPARATOR: char = '\u{1}';

/// Content-hash key for a single record.
///
/// Identical field values in identical order always yield the identical
/// key, on every call and across process runs.
pub fn content_key(record: &Record) -> String {
    let joined: Vec<String> = record.value_strings().collect();
    content_key_for_bytes(joined.join(&FIELD_SEPARATOR.to_string()).as_bytes())
}

/// Content-hash key for arbitrary serialized bytes (e.g. a batched NDJSON
/// document).
pub fn content_key_for_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Run-scoped sequence key generator.
///
/// Keys sort by generation order within a run and embed the run's start
/// time, so retried invocations write into a fresh key space instead of
/// interleaving with a previous run's objects.
#[derive(Debug)]
pub struct SequenceKeys {
    run_stamp: String,
    counter: AtomicU64,
}

impl SequenceKeys {
    pub fn new() -> Self {
        Self {
            run_stamp: Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn next(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}_{:06}", self.run_stamp, seq)
    }
}

impl Default for SequenceKeys {
    fn default() -> Self {
        Self::new()
    }
}
