//! Mutation applier
//!
//! Turns one bin change into index store operations. For each candidate
//! index the old value yields DELETE keys and the new value INSERT keys
//! (or the list diff does, when both are lists). Every DELETE of the
//! mutation is applied before any INSERT, one key at a time under that
//! key's partition lock.
//!
//! Application is best effort: a failing key, or a value that yields no
//! keys at all, is counted in the index's statistics and the remaining
//! keys still go through.

use super::diff;
use super::errors::StoreError;
use super::instance::{BinId, IndexHandle, IndexState, PartitionGuard};
use super::key::{IndexKey, RecordKey};
use super::memory::MemoryAccount;
use super::registry::Registry;
use super::sbin::{SBin, SbinOp};
use super::store::{DeleteOutcome, InsertOutcome};
use super::value::Value;
use crate::observability::{log_event_with_fields, Event};

/// What one mutation did to the index store
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Candidate indexes consulted
    pub indexes: usize,
    /// Entries added
    pub inserted: u64,
    /// Entries removed
    pub deleted: u64,
    /// Keys that failed to apply
    pub failed: u64,
}

impl ApplyOutcome {
    fn merge(&mut self, other: ApplyOutcome) {
        self.indexes += other.indexes;
        self.inserted += other.inserted;
        self.deleted += other.deleted;
        self.failed += other.failed;
    }
}

/// Apply a bin change for one record.
pub fn apply(
    registry: &Registry,
    set: Option<&str>,
    bin: BinId,
    old: Option<&Value>,
    new: Option<&Value>,
    record: &RecordKey,
) -> ApplyOutcome {
    if !registry.has_any_index(bin) {
        return ApplyOutcome::default();
    }

    let candidates = registry.lookup_by_bin(set, bin);
    let mut sbins = Vec::with_capacity(candidates.len() * 2);
    let mut rejected = 0;
    for index in &candidates {
        rejected += build_sbins(index, old, new, &mut sbins);
    }

    let mut outcome = apply_sbins(sbins, record);
    outcome.indexes = candidates.len();
    outcome.failed += rejected;
    outcome
}

/// Sbins one index needs for an `old` → `new` change. Returns how many
/// values could not be turned into keys.
///
/// A rejected value counts as a failed write or delete. A rejected new
/// value leaves the record unindexed, so the index is marked desynced.
pub fn build_sbins(
    index: &IndexHandle,
    old: Option<&Value>,
    new: Option<&Value>,
    out: &mut Vec<SBin>,
) -> u64 {
    if let (Some(Value::List(old_items)), Some(Value::List(new_items))) = (old, new) {
        if let Some(sbins) = diff::diff_sbins(index, old_items, new_items) {
            out.extend(sbins);
            return 0;
        }
    }
    let mut rejected = 0;
    if let Some(old) = old {
        rejected += push_collected(index, SbinOp::Delete, old, out);
    }
    if let Some(new) = new {
        rejected += push_collected(index, SbinOp::Insert, new, out);
    }
    rejected
}

fn push_collected(index: &IndexHandle, op: SbinOp, value: &Value, out: &mut Vec<SBin>) -> u64 {
    let e = match SBin::collect(index, op, value) {
        Ok(sbin) => {
            if !sbin.is_empty() {
                out.push(sbin);
            }
            return 0;
        }
        Err(e) => e,
    };

    match op {
        SbinOp::Insert => {
            index.mark_desync();
            index.stats().record_write(false, true);
        }
        SbinOp::Delete => index.stats().record_delete(false, true),
    }
    let name = index.definition().qualified_name();
    log_event_with_fields(
        Event::SindexKeyRejected,
        &[("index", &name), ("op", op.as_str()), ("reason", &e.to_string())],
    );
    1
}

/// Apply sbins: all deletes first, then all inserts.
pub fn apply_sbins(sbins: Vec<SBin>, record: &RecordKey) -> ApplyOutcome {
    let (deletes, inserts): (Vec<SBin>, Vec<SBin>) =
        sbins.into_iter().partition(|s| s.op() == SbinOp::Delete);

    let mut outcome = ApplyOutcome::default();
    for sbin in deletes.iter().chain(inserts.iter()) {
        outcome.merge(apply_sbin(sbin, record));
    }
    outcome
}

fn apply_sbin(sbin: &SBin, record: &RecordKey) -> ApplyOutcome {
    let mut outcome = ApplyOutcome::default();
    let index = sbin.index();
    if index.assert_reserved().is_err() {
        outcome.failed = sbin.len() as u64;
        return outcome;
    }

    for key in sbin.keys() {
        let guard = index.read_meta();
        if guard.state() != IndexState::Active {
            // Destroyed mid-batch; nothing left to maintain
            break;
        }
        let mut shard = guard.lock_partition(index.partition_for(key));
        match sbin.op() {
            SbinOp::Insert => insert_key(index, &mut shard, *key, record, &mut outcome),
            SbinOp::Delete => delete_key(index, &mut shard, key, record, &mut outcome),
        }
    }
    outcome
}

fn insert_key(
    index: &IndexHandle,
    shard: &mut PartitionGuard<'_>,
    key: IndexKey,
    record: &RecordKey,
    outcome: &mut ApplyOutcome,
) {
    let stats = index.stats();
    let memory = index.memory();

    let cost = shard.insert_cost(&key);
    if memory.reserve(cost).is_err() {
        index.mark_desync();
        stats.record_write(false, true);
        outcome.failed += 1;
        return;
    }

    let before = shard.memory_size();
    let result = shard.insert(key, *record);
    settle(memory, cost, shard.memory_size().saturating_sub(before));

    match result {
        Ok(InsertOutcome::Inserted) => {
            stats.record_write(true, false);
            outcome.inserted += 1;
        }
        Ok(InsertOutcome::AlreadyPresent) => stats.record_write(false, false),
        Err(StoreError::OutOfMemory) => {
            index.mark_desync();
            stats.record_write(false, true);
            outcome.failed += 1;
        }
        Err(StoreError::Internal(_)) => {
            stats.record_write(false, true);
            outcome.failed += 1;
        }
    }
}

fn delete_key(
    index: &IndexHandle,
    shard: &mut PartitionGuard<'_>,
    key: &IndexKey,
    record: &RecordKey,
    outcome: &mut ApplyOutcome,
) {
    let stats = index.stats();

    let before = shard.memory_size();
    let result = shard.delete(key, record);
    let freed = before.saturating_sub(shard.memory_size());
    index.memory().release(freed);

    match result {
        Ok(DeleteOutcome::Removed) => {
            stats.record_delete(true, false);
            outcome.deleted += 1;
        }
        Ok(DeleteOutcome::NotFound) => stats.record_delete(false, false),
        Err(_) => {
            stats.record_delete(false, true);
            outcome.failed += 1;
        }
    }
}

/// Reconcile a reservation with what the store actually grew by.
fn settle(memory: &MemoryAccount, reserved: u64, actual: u64) {
    if reserved > actual {
        memory.release(reserved - actual);
    } else if actual > reserved {
        memory.charge(actual - reserved);
    }
}
