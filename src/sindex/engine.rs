//! Engine facade over every configured namespace

use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use super::applier::ApplyOutcome;
use super::config::EngineConfig;
use super::definition::IndexDefinition;
use super::errors::{MemoryTier, SindexError, SindexResult};
use super::instance::IndexHandle;
use super::key::RecordKey;
use super::manager::{IndexInfo, NamespaceIndexes, ReconcileReport};
use super::memory::MemoryBudget;
use super::stats::IndexStatsReport;
use super::store::{BTreeShardFactory, StoreFactory};
use super::value::Value;

/// Secondary index engine
///
/// Owns the global memory budget and one [`NamespaceIndexes`] per
/// configured namespace. Namespaces are fixed at construction.
pub struct IndexEngine {
    global: Arc<MemoryBudget>,
    namespaces: BTreeMap<String, NamespaceIndexes>,
}

impl IndexEngine {
    /// Engine backed by in-memory B-tree shards
    pub fn new(config: EngineConfig) -> SindexResult<Self> {
        Self::with_store_factory(config, Arc::new(BTreeShardFactory))
    }

    pub fn with_store_factory(
        config: EngineConfig,
        factory: Arc<dyn StoreFactory>,
    ) -> SindexResult<Self> {
        config.validate()?;
        let global = Arc::new(MemoryBudget::new(MemoryTier::Global, config.data_max_memory));

        let mut namespaces = BTreeMap::new();
        for ns in config.namespaces {
            let name = ns.name.clone();
            let indexes = NamespaceIndexes::new(ns, Arc::clone(&global), Arc::clone(&factory))?;
            namespaces.insert(name, indexes);
        }
        Ok(Self { global, namespaces })
    }

    pub fn namespace(&self, name: &str) -> SindexResult<&NamespaceIndexes> {
        self.namespaces
            .get(name)
            .ok_or_else(|| SindexError::not_found(format!("namespace {}", name)))
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &NamespaceIndexes> {
        self.namespaces.values()
    }

    pub fn create(&self, definition: IndexDefinition) -> SindexResult<Uuid> {
        self.namespace(&definition.namespace)?.create(definition)
    }

    pub fn destroy(&self, namespace: &str, name: &str) -> SindexResult<()> {
        self.namespace(namespace)?.destroy(name)
    }

    /// Converge every namespace on `definitions`. A namespace with no
    /// definitions loses all its indexes.
    pub fn reconcile(&self, definitions: &[IndexDefinition]) -> SindexResult<ReconcileReport> {
        if let Some(def) = definitions
            .iter()
            .find(|d| !self.namespaces.contains_key(&d.namespace))
        {
            return Err(SindexError::not_found(format!("namespace {}", def.namespace)));
        }

        let mut report = ReconcileReport::default();
        for (name, ns) in &self.namespaces {
            let wanted: Vec<IndexDefinition> = definitions
                .iter()
                .filter(|d| &d.namespace == name)
                .cloned()
                .collect();
            report.merge(ns.reconcile(&wanted));
        }
        Ok(report)
    }

    pub fn on_bin_change(
        &self,
        namespace: &str,
        set: Option<&str>,
        bin: &str,
        old: Option<&Value>,
        new: Option<&Value>,
        record: &RecordKey,
    ) -> SindexResult<ApplyOutcome> {
        Ok(self.namespace(namespace)?.on_bin_change(set, bin, old, new, record))
    }

    pub fn set_config(&self, namespace: &str, name: &str, param: &str, value: &str) -> SindexResult<()> {
        self.namespace(namespace)?.set_config(name, param, value)
    }

    pub fn stats(&self, namespace: &str, name: &str) -> SindexResult<IndexStatsReport> {
        self.namespace(namespace)?.stats(name)
    }

    pub fn reserve_for_read(&self, namespace: &str, name: &str) -> SindexResult<IndexHandle> {
        self.namespace(namespace)?.reserve_for_read(name)
    }

    /// Every index of every namespace, ordered by namespace then name
    pub fn list(&self) -> Vec<IndexInfo> {
        self.namespaces.values().flat_map(|ns| ns.list()).collect()
    }

    /// Bytes held across all namespaces
    pub fn memory_used(&self) -> u64 {
        self.global.used()
    }

    pub fn pending_reclaim(&self) -> usize {
        self.namespaces.values().map(|ns| ns.pending_reclaim()).sum()
    }
}
