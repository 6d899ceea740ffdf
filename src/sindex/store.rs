//! Index store shards
//!
//! Each index partition owns one shard of the ordered key → record store.
//! The engine only needs point insert/delete and a size estimate; range
//! queries are exposed for the query layer.

use std::collections::BTreeMap;
use std::ops::Bound;

use super::definition::IndexDefinition;
use super::errors::StoreResult;
use super::key::{IndexKey, RecordKey, DIGEST_LEN};

/// Fixed cost of a shard with no entries
pub const SHARD_BASE_BYTES: u64 = 64;

/// Bytes charged for a distinct key
pub const KEY_OVERHEAD_BYTES: u64 = 48;

/// Bytes charged per record entry under a key
pub const ENTRY_BYTES: u64 = DIGEST_LEN as u64;

/// Result of an insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

/// Result of a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Removed,
    NotFound,
}

/// One partition's shard of the index store
pub trait ShardStore: Send {
    fn insert(&mut self, key: IndexKey, record: RecordKey) -> StoreResult<InsertOutcome>;

    fn delete(&mut self, key: &IndexKey, record: &RecordKey) -> StoreResult<DeleteOutcome>;

    /// Records under exactly `key`, sorted ascending
    fn lookup_eq(&self, key: &IndexKey) -> Vec<RecordKey>;

    /// Records with keys in `[min, max]`; `None` leaves that side open
    fn range_query(&self, min: Option<&IndexKey>, max: Option<&IndexKey>) -> Vec<RecordKey>;

    /// Bytes `insert(key, _)` would add if the record is new
    fn insert_cost(&self, key: &IndexKey) -> u64;

    fn key_count(&self) -> u64;

    fn entry_count(&self) -> u64;

    fn memory_size(&self) -> u64;

    fn clear(&mut self);
}

/// Creates the shards of a new index
pub trait StoreFactory: Send + Sync {
    fn create_shard(&self, definition: &IndexDefinition, partition: usize) -> Box<dyn ShardStore>;
}

/// In-memory shard on a `BTreeMap`, records kept sorted per key
#[derive(Debug, Default)]
pub struct BTreeShard {
    tree: BTreeMap<IndexKey, Vec<RecordKey>>,
    entries: u64,
}

impl BTreeShard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ShardStore for BTreeShard {
    fn insert(&mut self, key: IndexKey, record: RecordKey) -> StoreResult<InsertOutcome> {
        let records = self.tree.entry(key).or_default();
        match records.binary_search(&record) {
            Ok(_) => Ok(InsertOutcome::AlreadyPresent),
            Err(pos) => {
                records.insert(pos, record);
                self.entries += 1;
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    fn delete(&mut self, key: &IndexKey, record: &RecordKey) -> StoreResult<DeleteOutcome> {
        let Some(records) = self.tree.get_mut(key) else {
            return Ok(DeleteOutcome::NotFound);
        };
        let outcome = match records.binary_search(record) {
            Ok(pos) => {
                records.remove(pos);
                self.entries -= 1;
                DeleteOutcome::Removed
            }
            Err(_) => DeleteOutcome::NotFound,
        };
        if records.is_empty() {
            self.tree.remove(key);
        }
        Ok(outcome)
    }

    fn lookup_eq(&self, key: &IndexKey) -> Vec<RecordKey> {
        self.tree.get(key).cloned().unwrap_or_default()
    }

    fn range_query(&self, min: Option<&IndexKey>, max: Option<&IndexKey>) -> Vec<RecordKey> {
        let lower = min.map_or(Bound::Unbounded, Bound::Included);
        let upper = max.map_or(Bound::Unbounded, Bound::Included);
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Vec::new();
            }
        }

        let mut result: Vec<RecordKey> = self
            .tree
            .range((lower, upper))
            .flat_map(|(_, records)| records.iter().copied())
            .collect();
        result.sort();
        result
    }

    fn insert_cost(&self, key: &IndexKey) -> u64 {
        if self.tree.contains_key(key) {
            ENTRY_BYTES
        } else {
            KEY_OVERHEAD_BYTES + ENTRY_BYTES
        }
    }

    fn key_count(&self) -> u64 {
        self.tree.len() as u64
    }

    fn entry_count(&self) -> u64 {
        self.entries
    }

    fn memory_size(&self) -> u64 {
        SHARD_BASE_BYTES + self.key_count() * KEY_OVERHEAD_BYTES + self.entries * ENTRY_BYTES
    }

    fn clear(&mut self) {
        self.tree.clear();
        self.entries = 0;
    }
}

/// Factory for `BTreeShard`
#[derive(Debug, Default, Clone, Copy)]
pub struct BTreeShardFactory;

impl StoreFactory for BTreeShardFactory {
    fn create_shard(&self, _definition: &IndexDefinition, _partition: usize) -> Box<dyn ShardStore> {
        Box::new(BTreeShard::new())
    }
}
