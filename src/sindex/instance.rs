//! Index instances and their lifecycle
//!
//! An instance is one registered definition plus runtime state. It moves
//! INACTIVE → ACTIVE → DESTROYED and is freed when the last handle drops.
//!
//! Ownership: the registry keeps the creator's strong reference and weak
//! lookup entries; every reader or writer holds an `IndexHandle`. Destroy
//! drops the creator's reference, so the instance goes away exactly when
//! the last in-flight holder releases.
//!
//! Locking: `read_meta` takes the per-instance lock, and a partition can
//! only be locked through the returned guard, so the instance lock is
//! always held while a partition lock is.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::Serialize;
use uuid::Uuid;

use super::config::IndexConfig;
use super::definition::{BinPath, IndexDefinition};
use super::errors::{SindexError, SindexResult};
use super::key::{IndexKey, RecordKey};
use super::memory::{MemoryAccount, MemoryBudget};
use super::stats::{IndexStats, IndexStatsReport};
use super::store::{ShardStore, StoreFactory};
use crate::observability::{log_event_with_fields, Event};

/// Namespace-local bin identifier
pub type BinId = u16;

/// Lifecycle state of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IndexState {
    Inactive,
    Active,
    Destroyed,
}

impl IndexState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => IndexState::Active,
            2 => IndexState::Destroyed,
            _ => IndexState::Inactive,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            IndexState::Inactive => 0,
            IndexState::Active => 1,
            IndexState::Destroyed => 2,
        }
    }
}

const FLAG_WRITE: u8 = 0b001;
const FLAG_READ: u8 = 0b010;
const FLAG_POPULATING: u8 = 0b100;

/// Counts destroyed instances that still have holders
#[derive(Debug, Default)]
pub struct ReclaimTracker {
    pending: AtomicUsize,
    reclaimed: AtomicU64,
}

impl ReclaimTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Destroyed but not yet freed
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Freed since start
    pub fn reclaimed(&self) -> u64 {
        self.reclaimed.load(Ordering::Relaxed)
    }
}

/// Partition selector; only obtainable from `partition_for`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionId(usize);

impl PartitionId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Everything needed to build an instance
pub(crate) struct InstanceBuilder<'a> {
    pub definition: IndexDefinition,
    pub path: BinPath,
    pub bin_id: BinId,
    pub partitions: usize,
    pub config: IndexConfig,
    pub factory: &'a dyn StoreFactory,
    pub global: Arc<MemoryBudget>,
    pub namespace: Arc<MemoryBudget>,
    pub tracker: Arc<ReclaimTracker>,
}

impl InstanceBuilder<'_> {
    /// Allocate partitions and charge their base footprint.
    pub fn build(self) -> SindexResult<Arc<IndexInstance>> {
        let shards: Vec<Mutex<Box<dyn ShardStore>>> = (0..self.partitions.max(1))
            .map(|p| Mutex::new(self.factory.create_shard(&self.definition, p)))
            .collect();
        let footprint: u64 = shards.iter().map(|s| s.lock().memory_size()).sum();

        let memory = MemoryAccount::new(self.global, self.namespace, self.config.data_max_memory);
        memory.reserve(footprint)?;

        Ok(Arc::new(IndexInstance {
            id: Uuid::new_v4(),
            definition: self.definition,
            path: self.path,
            bin_id: self.bin_id,
            created_at: Utc::now(),
            state: AtomicU8::new(IndexState::Inactive.as_u8()),
            flags: AtomicU8::new(0),
            desync: AtomicU64::new(0),
            meta: RwLock::new(self.config),
            partitions: shards.into_boxed_slice(),
            stats: IndexStats::new(),
            memory,
            tracker: self.tracker,
        }))
    }
}

/// Runtime object for one index definition
pub struct IndexInstance {
    id: Uuid,
    definition: IndexDefinition,
    path: BinPath,
    bin_id: BinId,
    created_at: DateTime<Utc>,
    state: AtomicU8,
    flags: AtomicU8,
    desync: AtomicU64,
    meta: RwLock<IndexConfig>,
    partitions: Box<[Mutex<Box<dyn ShardStore>>]>,
    stats: IndexStats,
    memory: MemoryAccount,
    tracker: Arc<ReclaimTracker>,
}

impl IndexInstance {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn path(&self) -> &BinPath {
        &self.path
    }

    pub fn bin_id(&self) -> BinId {
        self.bin_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> IndexState {
        IndexState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == IndexState::Active
    }

    fn has_flag(&self, flag: u8) -> bool {
        self.flags.load(Ordering::Acquire) & flag != 0
    }

    pub fn is_writable(&self) -> bool {
        self.has_flag(FLAG_WRITE)
    }

    pub fn is_readable(&self) -> bool {
        self.has_flag(FLAG_READ)
    }

    pub fn is_populating(&self) -> bool {
        self.has_flag(FLAG_POPULATING)
    }

    pub fn desync(&self) -> u64 {
        self.desync.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    pub fn memory(&self) -> &MemoryAccount {
        &self.memory
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Copy of the current runtime configuration
    pub fn config(&self) -> IndexConfig {
        self.meta.read().clone()
    }

    /// Registered: writable, not yet readable.
    pub(crate) fn activate(&self) {
        self.flags.store(FLAG_WRITE | FLAG_POPULATING, Ordering::Release);
        self.state.store(IndexState::Active.as_u8(), Ordering::Release);
    }

    /// Flip ACTIVE to DESTROYED under the instance lock. Returns false if
    /// the instance was not active.
    pub(crate) fn mark_destroyed(&self) -> bool {
        let _meta = self.meta.write();
        if self.state() != IndexState::Active {
            return false;
        }
        self.state.store(IndexState::Destroyed.as_u8(), Ordering::Release);
        self.flags.store(0, Ordering::Release);
        self.tracker.pending.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Population started: reads are refused until it completes.
    pub(crate) fn begin_populate(&self) {
        self.flags.fetch_and(!FLAG_READ, Ordering::AcqRel);
        self.flags.fetch_or(FLAG_POPULATING, Ordering::AcqRel);
    }

    /// Population failed: stays write-only.
    pub(crate) fn abort_populate(&self) {
        self.flags.fetch_and(!FLAG_POPULATING, Ordering::AcqRel);
    }

    /// Population finished: the index becomes readable.
    pub(crate) fn populate_done(&self) {
        self.flags.fetch_or(FLAG_READ, Ordering::AcqRel);
        self.flags.fetch_and(!FLAG_POPULATING, Ordering::AcqRel);
    }

    /// Record that at least one mutation was missed.
    pub fn mark_desync(&self) {
        self.desync.fetch_add(1, Ordering::AcqRel);
    }

    /// Forget `missed` desync marks. Marks added since they were
    /// counted are kept.
    pub(crate) fn settle_desync(&self, missed: u64) {
        let _ = self
            .desync
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| Some(d.saturating_sub(missed)));
    }

    /// Shard that owns `key`
    pub fn partition_for(&self, key: &IndexKey) -> PartitionId {
        PartitionId(key.partition(self.partitions.len()))
    }

    /// Take the instance lock for reading.
    pub fn read_meta(&self) -> InstanceGuard<'_> {
        InstanceGuard {
            instance: self,
            config: self.meta.read(),
        }
    }

    pub(crate) fn write_meta(&self) -> RwLockWriteGuard<'_, IndexConfig> {
        self.meta.write()
    }

    /// Read gating: refused while not readable or populating, or while
    /// desynced unless the index tolerates it.
    pub fn check_readable(&self) -> SindexResult<()> {
        let guard = self.read_meta();
        if !self.is_active() || !self.is_readable() || self.is_populating() {
            return Err(SindexError::not_readable(self.name()));
        }
        if self.desync() > 0 && !guard.config().ignore_not_sync {
            return Err(SindexError::not_readable(format!(
                "{} (desync {})",
                self.name(),
                self.desync()
            )));
        }
        Ok(())
    }

    /// Short state label: RW, WO, I or D
    pub fn state_label(&self) -> &'static str {
        match self.state() {
            IndexState::Destroyed => "D",
            IndexState::Inactive => "I",
            IndexState::Active => match (self.is_writable(), self.is_readable()) {
                (true, true) => "RW",
                (true, false) => "WO",
                _ => "I",
            },
        }
    }

    pub fn sync_state(&self) -> &'static str {
        if self.desync() > 0 {
            "needsync"
        } else {
            "synced"
        }
    }

    /// Remove every entry. Returns the bytes freed.
    pub(crate) fn clear_all(&self) -> u64 {
        let guard = self.read_meta();
        let mut freed = 0;
        for p in 0..self.partitions.len() {
            let mut shard = guard.lock_partition(PartitionId(p));
            let before = shard.memory_size();
            shard.clear();
            freed += before.saturating_sub(shard.memory_size());
        }
        drop(guard);
        self.memory.release(freed);
        freed
    }

    pub fn stats_report(&self) -> IndexStatsReport {
        let (mut keys, mut entries) = (0, 0);
        {
            let guard = self.read_meta();
            for p in 0..self.partitions.len() {
                let shard = guard.lock_partition(PartitionId(p));
                keys += shard.key_count();
                entries += shard.entry_count();
            }
        }
        IndexStatsReport {
            name: self.name().to_string(),
            keys,
            entries,
            memory_used: self.memory.index_used(),
            memory_cap: self.memory.index_cap(),
            load_pct: if self.is_readable() { 100 } else { 0 },
            desync: self.desync(),
            sync_state: self.sync_state(),
            state: self.state_label(),
            counters: self.stats.snapshot(),
        }
    }

    /// Records under exactly `key`
    pub fn lookup_eq(&self, key: &IndexKey) -> Vec<RecordKey> {
        let guard = self.read_meta();
        let shard = guard.lock_partition(self.partition_for(key));
        shard.lookup_eq(key)
    }

    /// Records with keys in `[min, max]` across all partitions, sorted
    pub fn lookup_range(&self, min: Option<&IndexKey>, max: Option<&IndexKey>) -> Vec<RecordKey> {
        let guard = self.read_meta();
        let mut result = Vec::new();
        for p in 0..self.partitions.len() {
            result.extend(guard.lock_partition(PartitionId(p)).range_query(min, max));
        }
        result.sort();
        result
    }
}

impl Drop for IndexInstance {
    fn drop(&mut self) {
        let held = self.memory.index_used();
        self.memory.release_all();
        if self.state() == IndexState::Destroyed {
            self.tracker.pending.fetch_sub(1, Ordering::AcqRel);
            self.tracker.reclaimed.fetch_add(1, Ordering::Relaxed);
            let index = self.definition.qualified_name();
            let bytes = held.to_string();
            log_event_with_fields(Event::SindexReclaim, &[("index", &index), ("bytes", &bytes)]);
        }
    }
}

impl fmt::Debug for IndexInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexInstance")
            .field("id", &self.id)
            .field("name", &self.definition.name)
            .field("bin_id", &self.bin_id)
            .field("state", &self.state())
            .field("partitions", &self.partitions.len())
            .finish()
    }
}

/// Shared lock on an instance's metadata
pub struct InstanceGuard<'a> {
    instance: &'a IndexInstance,
    config: RwLockReadGuard<'a, IndexConfig>,
}

impl InstanceGuard<'_> {
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn state(&self) -> IndexState {
        self.instance.state()
    }

    /// Lock one partition. The partition guard borrows this guard, so it
    /// cannot outlive the instance lock.
    pub fn lock_partition(&self, id: PartitionId) -> PartitionGuard<'_> {
        PartitionGuard {
            shard: self.instance.partitions[id.0].lock(),
        }
    }
}

/// Exclusive lock on one partition's shard
pub struct PartitionGuard<'g> {
    shard: MutexGuard<'g, Box<dyn ShardStore>>,
}

impl Deref for PartitionGuard<'_> {
    type Target = dyn ShardStore;

    fn deref(&self) -> &Self::Target {
        &**self.shard
    }
}

impl DerefMut for PartitionGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut **self.shard
    }
}

/// A reservation on an instance.
///
/// Holding a handle keeps the instance alive; dropping it releases the
/// reservation.
#[derive(Clone)]
pub struct IndexHandle(Arc<IndexInstance>);

impl IndexHandle {
    /// Reserve through a weak entry. Fails once the instance is destroyed.
    pub(crate) fn reserve(entry: &Weak<IndexInstance>) -> Option<Self> {
        let instance = entry.upgrade()?;
        (instance.state() != IndexState::Destroyed).then(|| Self(instance))
    }

    /// Reserve regardless of state, for listings.
    pub(crate) fn reserve_any(entry: &Weak<IndexInstance>) -> Option<Self> {
        entry.upgrade().map(Self)
    }

    pub(crate) fn from_owner(owner: &Arc<IndexInstance>) -> Self {
        Self(Arc::clone(owner))
    }

    /// Outstanding strong references, the registry's included
    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn release(self) {}

    pub fn same_instance(&self, other: &IndexHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Whether a weak registry entry points at this instance
    pub(crate) fn is_entry(&self, entry: &Weak<IndexInstance>) -> bool {
        std::ptr::eq(entry.as_ptr(), Arc::as_ptr(&self.0))
    }

    /// A mutation in flight must see the creator's reference plus its own.
    pub(crate) fn assert_reserved(&self) -> SindexResult<()> {
        if self.reference_count() < 2 && self.state() != IndexState::Destroyed {
            let index = self.definition().qualified_name();
            let refs = self.reference_count().to_string();
            log_event_with_fields(
                Event::SindexAssertion,
                &[("index", &index), ("refs", &refs), ("check", "reservation")],
            );
            return Err(SindexError::unknown(format!(
                "improper reference count {} on {}",
                refs, index
            )));
        }
        Ok(())
    }
}

impl Deref for IndexHandle {
    type Target = IndexInstance;

    fn deref(&self) -> &IndexInstance {
        &self.0
    }
}

impl fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IndexHandle").field(&*self.0).finish()
    }
}
