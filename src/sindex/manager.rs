//! Per-namespace index management
//!
//! # API
//!
//! - `create(definition)` / `destroy(name)` - lifecycle
//! - `reconcile(definitions)` - converge on an authoritative set
//! - `on_bin_change(set, bin, old, new, record)` - maintain indexes after a write
//! - `populate(name, scan)` / `repair(name, scan)` - (re)build from records
//! - `empty_set(set)` - drop every entry of a set
//! - `set_config`, `stats`, `list`, `reserve_for_read`

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use uuid::Uuid;

use super::applier::{self, ApplyOutcome};
use super::config::{validate_partitions, IndexConfig, NamespaceConfig};
use super::definition::{IndexDefinition, IndexFlavor, KeyType};
use super::errors::{MemoryTier, SindexError, SindexResult};
use super::instance::{BinId, IndexHandle, InstanceBuilder, ReclaimTracker};
use super::key::RecordKey;
use super::memory::MemoryBudget;
use super::registry::{LookupMode, Registry, MAX_BINS};
use super::stats::IndexStatsReport;
use super::store::StoreFactory;
use super::value::Value;
use crate::observability::{log_event_with_fields, Event};

/// A record as seen by a population scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedRecord {
    pub record: RecordKey,
    pub set: Option<String>,
    pub bins: Vec<(String, Value)>,
}

/// Trait for scanning the record store during population
pub trait RecordScan {
    /// Next record, `None` at the end
    fn scan_next(&mut self) -> SindexResult<Option<ScannedRecord>>;

    /// Rewind to the first record
    fn reset(&mut self) -> SindexResult<()>;
}

/// Listing entry for one index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub id: Uuid,
    pub ns: String,
    pub set: Option<String>,
    pub name: String,
    pub bin: String,
    pub key_type: KeyType,
    pub flavor: IndexFlavor,
    pub path: String,
    pub sync_state: &'static str,
    pub state: &'static str,
    pub created_at: DateTime<Utc>,
}

impl IndexInfo {
    fn from_handle(handle: &IndexHandle) -> Self {
        let def = handle.definition();
        Self {
            id: handle.id(),
            ns: def.namespace.clone(),
            set: def.set.clone(),
            name: def.name.clone(),
            bin: handle.path().bin().to_string(),
            key_type: def.key_type,
            flavor: def.flavor,
            path: def.path.clone(),
            sync_state: handle.sync_state(),
            state: handle.state_label(),
            created_at: handle.created_at(),
        }
    }
}

impl fmt::Display for IndexInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ns={}:set={}:indexname={}:bin={}:type={}:indextype={}:path={}:sync_state={}:state={}",
            self.ns,
            self.set.as_deref().unwrap_or("NULL"),
            self.name,
            self.bin,
            self.key_type,
            self.flavor,
            self.path,
            self.sync_state,
            self.state
        )
    }
}

/// What `reconcile` changed, by qualified index name
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub recreated: Vec<String>,
    pub dropped: Vec<String>,
    pub unchanged: Vec<String>,
    pub failed: Vec<(String, SindexError)>,
}

impl ReconcileReport {
    pub fn merge(&mut self, other: ReconcileReport) {
        self.created.extend(other.created);
        self.recreated.extend(other.recreated);
        self.dropped.extend(other.dropped);
        self.unchanged.extend(other.unchanged);
        self.failed.extend(other.failed);
    }
}

/// Bin name → bin id, assigned on first use
#[derive(Default)]
struct BinTable {
    ids: RwLock<HashMap<String, BinId>>,
}

impl BinTable {
    fn lookup(&self, name: &str) -> Option<BinId> {
        self.ids.read().get(name).copied()
    }

    fn assign(&self, name: &str) -> SindexResult<BinId> {
        let mut ids = self.ids.write();
        if let Some(id) = ids.get(name) {
            return Ok(*id);
        }
        if ids.len() >= MAX_BINS {
            return Err(SindexError::invalid(format!(
                "bin name quota of {} exhausted",
                MAX_BINS
            )));
        }
        let id = ids.len() as BinId;
        ids.insert(name.to_string(), id);
        Ok(id)
    }
}

/// All secondary indexes of one namespace
pub struct NamespaceIndexes {
    config: NamespaceConfig,
    registry: Registry,
    bins: BinTable,
    global: Arc<MemoryBudget>,
    memory: Arc<MemoryBudget>,
    factory: Arc<dyn StoreFactory>,
    tracker: Arc<ReclaimTracker>,
    applied_overrides: Mutex<HashSet<String>>,
}

impl NamespaceIndexes {
    pub fn new(
        config: NamespaceConfig,
        global: Arc<MemoryBudget>,
        factory: Arc<dyn StoreFactory>,
    ) -> SindexResult<Self> {
        config.validate()?;
        Ok(Self {
            registry: Registry::new(config.max_indexes),
            memory: Arc::new(MemoryBudget::new(MemoryTier::Namespace, config.data_max_memory)),
            bins: BinTable::default(),
            global,
            factory,
            tracker: Arc::new(ReclaimTracker::new()),
            applied_overrides: Mutex::new(HashSet::new()),
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Bytes held by this namespace's indexes
    pub fn memory_used(&self) -> u64 {
        self.memory.used()
    }

    /// Destroyed instances still held by someone
    pub fn pending_reclaim(&self) -> usize {
        self.tracker.pending()
    }

    /// Whether any active index covers the bin
    pub fn has_any_index(&self, bin: &str) -> bool {
        self.bins
            .lookup(bin)
            .map(|id| self.registry.has_any_index(id))
            .unwrap_or(false)
    }

    /// Create and register an index. It starts write-only; call
    /// `populate` to make it readable.
    pub fn create(&self, definition: IndexDefinition) -> SindexResult<Uuid> {
        let name = definition.qualified_name();
        self.try_create(definition).map_err(|e| {
            log_event_with_fields(
                Event::SindexCreateFailed,
                &[("index", &name), ("code", e.code()), ("reason", &e.to_string())],
            );
            e
        })
    }

    fn try_create(&self, definition: IndexDefinition) -> SindexResult<Uuid> {
        if definition.namespace != self.config.name {
            return Err(SindexError::invalid(format!(
                "definition for namespace {} sent to {}",
                definition.namespace, self.config.name
            )));
        }
        let path = definition.validate()?;
        let partitions = definition
            .num_partitions
            .unwrap_or(self.config.num_partitions);
        validate_partitions(partitions)?;

        if self
            .registry
            .lookup_by_name(&definition.name, LookupMode::ActiveOnly)
            .is_some()
        {
            return Err(SindexError::already_exists(definition.qualified_name()));
        }

        let bin_id = self.bins.assign(path.bin())?;
        let config = match self.config.override_for(&definition.name) {
            Some(o) => {
                self.applied_overrides.lock().insert(definition.name.clone());
                o.clone()
            }
            None => IndexConfig::default(),
        };

        let instance = InstanceBuilder {
            definition,
            path,
            bin_id,
            partitions: partitions as usize,
            config,
            factory: self.factory.as_ref(),
            global: Arc::clone(&self.global),
            namespace: Arc::clone(&self.memory),
            tracker: Arc::clone(&self.tracker),
        }
        .build()?;
        let handle = self.registry.register(instance)?;

        let def = handle.definition();
        let index = def.qualified_name();
        let partitions = handle.num_partitions().to_string();
        log_event_with_fields(
            Event::SindexCreate,
            &[
                ("index", &index),
                ("path", &def.path),
                ("type", def.key_type.as_str()),
                ("indextype", def.flavor.as_str()),
                ("partitions", &partitions),
            ],
        );
        Ok(handle.id())
    }

    /// Destroy an active index. Memory is returned once the last holder
    /// releases it.
    pub fn destroy(&self, name: &str) -> SindexResult<()> {
        let handle = self
            .registry
            .lookup_by_name(name, LookupMode::ActiveOnly)
            .ok_or_else(|| SindexError::not_found(format!("{}:{}", self.config.name, name)))?;
        let owner = self
            .registry
            .unregister(&handle)
            .ok_or_else(|| SindexError::not_found(format!("{}:{}", self.config.name, name)))?;

        let index = handle.definition().qualified_name();
        // ours and the creator's do not count as outstanding
        let holders = handle.reference_count().saturating_sub(2).to_string();
        log_event_with_fields(Event::SindexDestroy, &[("index", &index), ("holders", &holders)]);

        drop(owner);
        drop(handle);
        Ok(())
    }

    /// Converge on an authoritative set of definitions.
    ///
    /// A name whose definition changed is destroyed and recreated; active
    /// indexes absent from `definitions` are destroyed. Indexes created
    /// here start write-only.
    pub fn reconcile(&self, definitions: &[IndexDefinition]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut wanted = HashSet::new();

        for def in definitions {
            let qualified = def.qualified_name();
            if def.namespace != self.config.name {
                report.failed.push((
                    qualified,
                    SindexError::invalid("definition for another namespace"),
                ));
                continue;
            }
            wanted.insert(def.name.as_str());

            let existing = self.registry.lookup_by_name(&def.name, LookupMode::ActiveOnly);
            match existing {
                Some(handle) if handle.definition().same_definition(def) => {
                    report.unchanged.push(qualified);
                }
                Some(handle) => {
                    drop(handle);
                    let result = self.destroy(&def.name).and_then(|_| self.create(def.clone()));
                    match result {
                        Ok(_) => report.recreated.push(qualified),
                        Err(e) => report.failed.push((qualified, e)),
                    }
                }
                None => match self.create(def.clone()) {
                    Ok(_) => report.created.push(qualified),
                    Err(e) => report.failed.push((qualified, e)),
                },
            }
        }

        for handle in self.registry.all(LookupMode::ActiveOnly) {
            if wanted.contains(handle.name()) {
                continue;
            }
            let name = handle.name().to_string();
            let qualified = handle.definition().qualified_name();
            drop(handle);
            match self.destroy(&name) {
                Ok(()) => report.dropped.push(qualified),
                Err(e) => report.failed.push((qualified, e)),
            }
        }

        let counts = [
            ("created", report.created.len().to_string()),
            ("recreated", report.recreated.len().to_string()),
            ("dropped", report.dropped.len().to_string()),
            ("failed", report.failed.len().to_string()),
        ];
        let mut fields: Vec<(&str, &str)> = counts.iter().map(|(k, v)| (*k, v.as_str())).collect();
        fields.push(("ns", &self.config.name));
        log_event_with_fields(Event::SindexReconcile, &fields);
        report
    }

    /// Maintain indexes after a record write changed one bin.
    pub fn on_bin_change(
        &self,
        set: Option<&str>,
        bin: &str,
        old: Option<&Value>,
        new: Option<&Value>,
        record: &RecordKey,
    ) -> ApplyOutcome {
        match self.bins.lookup(bin) {
            Some(bin_id) => applier::apply(&self.registry, set, bin_id, old, new, record),
            None => ApplyOutcome::default(),
        }
    }

    /// Index one record's bins into one index.
    pub fn put_record(&self, name: &str, record: &ScannedRecord) -> SindexResult<ApplyOutcome> {
        let handle = self.active(name)?;
        Ok(Self::index_record(&handle, record))
    }

    fn index_record(handle: &IndexHandle, record: &ScannedRecord) -> ApplyOutcome {
        if handle.definition().set.as_deref() != record.set.as_deref() {
            return ApplyOutcome::default();
        }
        let bin = handle.path().bin();
        let mut sbins = Vec::new();
        let mut rejected = 0;
        for (_, value) in record.bins.iter().filter(|(name, _)| name == bin) {
            rejected += applier::build_sbins(handle, None, Some(value), &mut sbins);
        }
        let mut outcome = applier::apply_sbins(sbins, &record.record);
        outcome.failed += rejected;
        outcome
    }

    /// Fill an index from a record scan, then make it readable.
    ///
    /// The index refuses reads while the scan runs. A failed scan leaves
    /// it write-only.
    pub fn populate<S: RecordScan>(&self, name: &str, scan: &mut S) -> SindexResult<u64> {
        let handle = self.active(name)?;
        Self::populate_handle(&handle, scan)
    }

    fn populate_handle<S: RecordScan>(handle: &IndexHandle, scan: &mut S) -> SindexResult<u64> {
        let index = handle.definition().qualified_name();
        handle.begin_populate();
        log_event_with_fields(Event::SindexPopulateBegin, &[("index", &index)]);

        let records = match Self::scan_into(handle, scan) {
            Ok(records) => records,
            Err(e) => {
                handle.abort_populate();
                log_event_with_fields(
                    Event::SindexPopulateFailed,
                    &[("index", &index), ("reason", &e.to_string())],
                );
                return Err(e);
            }
        };
        handle.stats().add_populated(records);
        handle.populate_done();

        let count = records.to_string();
        log_event_with_fields(
            Event::SindexPopulateComplete,
            &[("index", &index), ("records", &count)],
        );
        Ok(records)
    }

    fn scan_into<S: RecordScan>(handle: &IndexHandle, scan: &mut S) -> SindexResult<u64> {
        scan.reset()?;
        let mut records = 0u64;
        while let Some(record) = scan.scan_next()? {
            Self::index_record(handle, &record);
            records += 1;
        }
        Ok(records)
    }

    /// Rebuild a desynced index. Returns false if it was in sync.
    ///
    /// The desync count drops only once the rebuild completes; marks
    /// raised by writes during the rebuild survive it.
    pub fn repair<S: RecordScan>(&self, name: &str, scan: &mut S) -> SindexResult<bool> {
        let handle = self.active(name)?;
        let missed = handle.desync();
        if missed == 0 {
            return Ok(false);
        }

        let index = handle.definition().qualified_name();
        let count = missed.to_string();
        log_event_with_fields(Event::SindexRepair, &[("index", &index), ("desync", &count)]);

        handle.begin_populate();
        handle.clear_all();
        handle.stats().clear_objects();
        Self::populate_handle(&handle, scan)?;
        handle.settle_desync(missed);
        Ok(true)
    }

    /// Remove every entry of indexes filtered on `set`. Returns how many
    /// indexes were emptied.
    pub fn empty_set(&self, set: Option<&str>) -> usize {
        let mut emptied = 0;
        for handle in self.registry.all(LookupMode::ActiveOnly) {
            if handle.definition().set.as_deref() != set {
                continue;
            }
            handle.clear_all();
            handle.stats().clear_objects();
            emptied += 1;
        }

        let count = emptied.to_string();
        log_event_with_fields(
            Event::SindexSetEmptied,
            &[
                ("ns", &self.config.name),
                ("set", set.unwrap_or("NULL")),
                ("indexes", &count),
            ],
        );
        emptied
    }

    /// Change one runtime parameter of an index.
    pub fn set_config(&self, name: &str, param: &str, value: &str) -> SindexResult<()> {
        let handle = self.active(name)?;
        {
            let mut config = handle.write_meta();
            config.set_param(param, value, handle.memory().index_used())?;
            handle.memory().set_index_cap(config.data_max_memory);
        }

        let index = handle.definition().qualified_name();
        log_event_with_fields(
            Event::SindexConfigChange,
            &[("index", &index), ("param", param), ("value", value)],
        );
        Ok(())
    }

    /// Every index known by name, destroyed-but-held ones included
    pub fn list(&self) -> Vec<IndexInfo> {
        self.registry
            .all(LookupMode::IncludeDestroyed)
            .iter()
            .map(IndexInfo::from_handle)
            .collect()
    }

    pub fn stats(&self, name: &str) -> SindexResult<IndexStatsReport> {
        self.registry
            .lookup_by_name(name, LookupMode::IncludeDestroyed)
            .map(|h| h.stats_report())
            .ok_or_else(|| SindexError::not_found(format!("{}:{}", self.config.name, name)))
    }

    /// Reserve an index for a query, subject to read gating.
    pub fn reserve_for_read(&self, name: &str) -> SindexResult<IndexHandle> {
        let handle = self.active(name)?;
        match handle.check_readable() {
            Ok(()) => {
                handle.stats().record_read(true);
                Ok(handle)
            }
            Err(e) => {
                handle.stats().record_read(false);
                Err(e)
            }
        }
    }

    /// Record that a mutation was missed for this index.
    pub fn mark_desync(&self, name: &str) -> SindexResult<()> {
        self.active(name)?.mark_desync();
        Ok(())
    }

    /// Boot-time index stanzas that no created index has used
    pub fn report_unused_overrides(&self) -> Vec<String> {
        let applied = self.applied_overrides.lock();
        let unused: Vec<String> = self
            .config
            .indexes
            .iter()
            .filter(|o| !applied.contains(&o.name))
            .map(|o| o.name.clone())
            .collect();
        for name in &unused {
            log_event_with_fields(
                Event::ConfigOverrideUnused,
                &[("ns", &self.config.name), ("index", name)],
            );
        }
        unused
    }

    fn active(&self, name: &str) -> SindexResult<IndexHandle> {
        self.registry
            .lookup_by_name(name, LookupMode::ActiveOnly)
            .ok_or_else(|| SindexError::not_found(format!("{}:{}", self.config.name, name)))
    }
}
