//! Per-index statistics
//!
//! Counters are atomics with relaxed ordering; a snapshot is exact per
//! counter but not across counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Runtime counters for one index
#[derive(Debug, Default)]
pub struct IndexStats {
    /// Entries currently in the index
    objects: AtomicU64,
    /// Insert attempts
    writes: AtomicU64,
    /// Insert failures
    write_errors: AtomicU64,
    /// Delete attempts
    deletes: AtomicU64,
    /// Delete failures
    delete_errors: AtomicU64,
    /// Read reservations granted
    reads: AtomicU64,
    /// Read reservations refused
    read_errors: AtomicU64,
    /// Records applied by population scans
    populated: AtomicU64,
}

impl IndexStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_write(&self, inserted: bool, failed: bool) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.write_errors.fetch_add(1, Ordering::Relaxed);
        } else if inserted {
            self.objects.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_delete(&self, removed: bool, failed: bool) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.delete_errors.fetch_add(1, Ordering::Relaxed);
        } else if removed {
            // Never wraps below zero even if a caller double counts
            let _ = self
                .objects
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        }
    }

    pub fn record_read(&self, granted: bool) {
        if granted {
            self.reads.fetch_add(1, Ordering::Relaxed);
        } else {
            self.read_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn add_populated(&self, records: u64) {
        self.populated.fetch_add(records, Ordering::Relaxed);
    }

    /// Drop all entries: counted as deletes, objects reset to zero.
    pub fn clear_objects(&self) -> u64 {
        let removed = self.objects.swap(0, Ordering::Relaxed);
        self.deletes.fetch_add(removed, Ordering::Relaxed);
        removed
    }

    pub fn objects(&self) -> u64 {
        self.objects.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> IndexStatsSnapshot {
        IndexStatsSnapshot {
            objects: self.objects.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            delete_errors: self.delete_errors.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            populated: self.populated.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of `IndexStats`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStatsSnapshot {
    pub objects: u64,
    pub writes: u64,
    pub write_errors: u64,
    pub deletes: u64,
    pub delete_errors: u64,
    pub reads: u64,
    pub read_errors: u64,
    pub populated: u64,
}

/// Full statistics report for one index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStatsReport {
    pub name: String,
    /// Distinct keys across all partitions
    pub keys: u64,
    /// Record entries across all partitions
    pub entries: u64,
    /// Bytes charged to the index
    pub memory_used: u64,
    pub memory_cap: u64,
    /// 100 once readable, 0 while populating
    pub load_pct: u8,
    pub desync: u64,
    pub sync_state: &'static str,
    pub state: &'static str,
    pub counters: IndexStatsSnapshot,
}

impl IndexStatsReport {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// `key=value;` form used by info commands
    pub fn to_info_string(&self) -> String {
        let c = &self.counters;
        format!(
            "keys={};entries={};ibtr_memory_used={};data_memory_used={};load_pct={};\
             stat_gc_recs={};write_success={};write_error={};delete_success={};\
             delete_error={};query_reqs={};query_errors={};desync={};sync_state={};state={}",
            self.keys,
            self.entries,
            self.memory_used,
            self.memory_used,
            self.load_pct,
            c.populated,
            c.writes.saturating_sub(c.write_errors),
            c.write_errors,
            c.deletes.saturating_sub(c.delete_errors),
            c.delete_errors,
            c.reads,
            c.read_errors,
            self.desync,
            self.sync_state,
            self.state,
        )
    }
}
