//! Per-namespace index registry
//!
//! Three lookup structures behind one reader-writer lock:
//!
//! - a bit per bin id, set while at least one active index covers the bin
//! - `(set, bin id)` → candidate instances
//! - index name → instance
//!
//! The bit-set is probed without the lock so writes to unindexed bins
//! never touch the registry. It only changes under the write lock.
//!
//! Lookup entries are weak; the registry's strong references are the
//! creators' (`owners`). A destroyed instance leaves the candidate lists
//! immediately but its name entry lingers until the last holder drops it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use uuid::Uuid;

use super::errors::{SindexError, SindexResult};
use super::instance::{BinId, IndexHandle, IndexInstance};

/// Number of distinct bin ids per namespace
pub const MAX_BINS: usize = 1 << 16;

/// Whether lookups may return destroyed instances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    ActiveOnly,
    IncludeDestroyed,
}

struct BinBitmap {
    words: Box<[AtomicU64]>,
}

impl BinBitmap {
    fn new() -> Self {
        Self {
            words: (0..MAX_BINS / 64).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    fn slot(bin: BinId) -> (usize, u64) {
        let bin = bin as usize;
        (bin / 64, 1u64 << (bin % 64))
    }

    fn contains(&self, bin: BinId) -> bool {
        let (word, mask) = Self::slot(bin);
        self.words[word].load(Ordering::Acquire) & mask != 0
    }

    fn set(&self, bin: BinId) {
        let (word, mask) = Self::slot(bin);
        self.words[word].fetch_or(mask, Ordering::AcqRel);
    }

    fn clear(&self, bin: BinId) {
        let (word, mask) = Self::slot(bin);
        self.words[word].fetch_and(!mask, Ordering::AcqRel);
    }
}

type Candidates = Vec<Weak<IndexInstance>>;

/// Candidate lists for one bin, split by set filter. The no-set filter
/// has its own list so no set name can alias it.
#[derive(Default)]
struct SetLists {
    unset: Candidates,
    named: HashMap<String, Candidates>,
}

impl SetLists {
    fn get(&self, set: Option<&str>) -> Option<&Candidates> {
        match set {
            None => Some(&self.unset),
            Some(name) => self.named.get(name),
        }
    }

    fn push(&mut self, set: Option<&str>, entry: Weak<IndexInstance>) {
        match set {
            None => self.unset.push(entry),
            Some(name) => self.named.entry(name.to_string()).or_default().push(entry),
        }
    }

    /// Drop `handle`'s entry, and dead ones, from its set's list.
    fn remove(&mut self, set: Option<&str>, handle: &IndexHandle) {
        let keep = |entry: &Weak<IndexInstance>| !handle.is_entry(entry) && entry.strong_count() > 0;
        match set {
            None => self.unset.retain(keep),
            Some(name) => {
                if let Some(list) = self.named.get_mut(name) {
                    list.retain(keep);
                    if list.is_empty() {
                        self.named.remove(name);
                    }
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.unset.is_empty() && self.named.is_empty()
    }

    fn entries(&self) -> impl Iterator<Item = &Weak<IndexInstance>> {
        self.unset.iter().chain(self.named.values().flatten())
    }
}

#[derive(Default)]
struct RegistryInner {
    owners: HashMap<Uuid, Arc<IndexInstance>>,
    by_name: HashMap<String, Weak<IndexInstance>>,
    by_bin: HashMap<BinId, SetLists>,
}

/// Lookup structures for one namespace
pub struct Registry {
    max_indexes: usize,
    inner: RwLock<RegistryInner>,
    bins: BinBitmap,
}

impl Registry {
    pub fn new(max_indexes: usize) -> Self {
        Self {
            max_indexes,
            inner: RwLock::new(RegistryInner::default()),
            bins: BinBitmap::new(),
        }
    }

    /// Register a freshly built instance and make it active.
    ///
    /// Refused if an active index already has the name or the same
    /// definition, or the namespace is full. A name still held by a
    /// destroyed instance is taken over.
    pub fn register(&self, instance: Arc<IndexInstance>) -> SindexResult<IndexHandle> {
        let def = instance.definition().clone();
        let bin = instance.bin_id();
        let mut inner = self.inner.write();

        inner.by_name.retain(|_, entry| entry.strong_count() > 0);

        if inner
            .by_name
            .get(&def.name)
            .and_then(IndexHandle::reserve)
            .is_some()
        {
            return Err(SindexError::already_exists(def.qualified_name()));
        }

        let duplicate = inner
            .by_bin
            .get(&bin)
            .and_then(|sets| sets.get(def.set.as_deref()))
            .into_iter()
            .flatten()
            .filter_map(IndexHandle::reserve)
            .find(|other| other.definition().same_definition(&def));
        if let Some(other) = duplicate {
            return Err(SindexError::already_exists(format!(
                "{} has the same definition as {}",
                def.qualified_name(),
                other.name()
            )));
        }

        if inner.owners.len() >= self.max_indexes {
            return Err(SindexError::invalid(format!(
                "namespace {} already has {} indexes",
                def.namespace, self.max_indexes
            )));
        }

        instance.activate();
        let entry = Arc::downgrade(&instance);
        inner
            .by_bin
            .entry(bin)
            .or_default()
            .push(def.set.as_deref(), entry.clone());
        inner.by_name.insert(def.name.clone(), entry);
        self.bins.set(bin);

        let handle = IndexHandle::from_owner(&instance);
        inner.owners.insert(instance.id(), instance);
        Ok(handle)
    }

    /// Destroy a registered instance: flip it to DESTROYED, drop it from
    /// its candidate list, clear the bin bit if no sibling remains, and
    /// hand back the creator's reference.
    ///
    /// The caller drops the returned reference after the registry lock is
    /// released. `None` if the instance was not active.
    pub fn unregister(&self, handle: &IndexHandle) -> Option<Arc<IndexInstance>> {
        let bin = handle.bin_id();
        let mut inner = self.inner.write();

        if !handle.mark_destroyed() {
            return None;
        }

        if let Some(sets) = inner.by_bin.get_mut(&bin) {
            sets.remove(handle.definition().set.as_deref(), handle);
            if sets.is_empty() {
                inner.by_bin.remove(&bin);
            }
        }

        // Candidate lists only hold live registrations, so any entry left
        // for this bin under any set keeps the bit.
        let still_indexed = inner
            .by_bin
            .get(&bin)
            .map(|sets| sets.entries().any(|entry| entry.strong_count() > 0))
            .unwrap_or(false);
        if !still_indexed {
            self.bins.clear(bin);
        }

        inner.owners.remove(&handle.id())
    }

    pub fn lookup_by_name(&self, name: &str, mode: LookupMode) -> Option<IndexHandle> {
        let inner = self.inner.read();
        let entry = inner.by_name.get(name)?;
        match mode {
            LookupMode::ActiveOnly => IndexHandle::reserve(entry),
            LookupMode::IncludeDestroyed => IndexHandle::reserve_any(entry),
        }
    }

    /// Active candidates for a bin under a set filter, reserved.
    pub fn lookup_by_bin(&self, set: Option<&str>, bin: BinId) -> Vec<IndexHandle> {
        let inner = self.inner.read();
        inner
            .by_bin
            .get(&bin)
            .and_then(|sets| sets.get(set))
            .map(|list| list.iter().filter_map(IndexHandle::reserve).collect())
            .unwrap_or_default()
    }

    /// Lock-free probe: does any active index cover `bin`?
    pub fn has_any_index(&self, bin: BinId) -> bool {
        self.bins.contains(bin)
    }

    /// Every index known by name, sorted by name
    pub fn all(&self, mode: LookupMode) -> Vec<IndexHandle> {
        let inner = self.inner.read();
        let mut handles: Vec<IndexHandle> = inner
            .by_name
            .values()
            .filter_map(|entry| match mode {
                LookupMode::ActiveOnly => IndexHandle::reserve(entry),
                LookupMode::IncludeDestroyed => IndexHandle::reserve_any(entry),
            })
            .collect();
        handles.sort_by(|a, b| a.name().cmp(b.name()));
        handles
    }

    /// Number of active indexes
    pub fn len(&self) -> usize {
        self.inner.read().owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
