//! Secondary index maintenance engine
//!
//! Secondary indexes map values found at a path inside a record's bins
//! to the records holding them. This module keeps them in step with
//! record writes.
//!
//! # Design Principles
//!
//! - Per-namespace registry: lookups by name and by `(set, bin)` behind
//!   one lock, with a lock-free per-bin bit for unindexed writes
//! - Reference counted instances: destroy is immediate, memory returns
//!   when the last reservation is dropped
//! - Three-tier memory caps: global, namespace, index
//! - Partitioned stores: one lock per shard, never two held at once
//!
//! # Invariants
//!
//! - Instance lock before partition lock, enforced by `InstanceGuard`
//! - Every DELETE of a mutation is applied before any INSERT
//! - A list-to-list update never emits a key in both directions
//! - A missed mutation marks the index desynced until repaired

mod applier;
mod config;
mod definition;
mod diff;
mod engine;
mod errors;
pub mod geo;
mod instance;
mod key;
mod manager;
mod memory;
mod path;
mod registry;
mod sbin;
mod stats;
mod store;
mod value;

pub use applier::{apply, apply_sbins, build_sbins, ApplyOutcome};
pub use config::{
    EngineConfig, IndexConfig, IndexConfigOverride, NamespaceConfig, DEFAULT_GC_MAX_UNITS,
    DEFAULT_GC_PERIOD, DEFAULT_PARTITIONS, MAX_INDEXES, MAX_PARTITIONS, MIN_PARTITIONS, UNLIMITED,
};
pub use definition::{
    BinPath, IndexDefinition, IndexFlavor, KeyType, MapKey, PathStep, MAX_BIN_NAME_LEN,
    MAX_INDEX_NAME_LEN, MAX_PATH_DEPTH, MAX_PATH_LEN,
};
pub use diff::{diff_keys, diff_sbins, qualifies, KeyDiff};
pub use engine::IndexEngine;
pub use errors::{MemoryTier, SindexError, SindexResult, StoreError, StoreResult};
pub use instance::{
    BinId, IndexHandle, IndexInstance, IndexState, InstanceGuard, PartitionGuard, PartitionId,
    ReclaimTracker,
};
pub use key::{IndexKey, RecordKey, DIGEST_LEN, MAX_STRING_KEY_LEN};
pub use manager::{IndexInfo, NamespaceIndexes, ReconcileReport, RecordScan, ScannedRecord};
pub use memory::{MemoryAccount, MemoryBudget};
pub use path::{accepts, extract, resolve, scalar_matches};
pub use registry::{LookupMode, Registry, MAX_BINS};
pub use sbin::{collect_keys, KeySet, SBin, SbinOp};
pub use stats::{IndexStats, IndexStatsReport, IndexStatsSnapshot};
pub use store::{
    BTreeShard, BTreeShardFactory, DeleteOutcome, InsertOutcome, ShardStore, StoreFactory,
    ENTRY_BYTES, KEY_OVERHEAD_BYTES, SHARD_BASE_BYTES,
};
pub use value::Value;
