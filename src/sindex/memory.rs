//! Hierarchical memory accounting
//!
//! Every byte an index holds is charged to three budgets: the engine-wide
//! budget, its namespace's budget and its own. A reservation succeeds only
//! if all three have room; otherwise nothing is charged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::errors::{MemoryTier, SindexError, SindexResult};
use crate::observability::{log_event_with_fields, Event};

/// One tier's usage and cap
#[derive(Debug)]
pub struct MemoryBudget {
    tier: MemoryTier,
    used: AtomicU64,
    cap: AtomicU64,
}

impl MemoryBudget {
    pub fn new(tier: MemoryTier, cap: u64) -> Self {
        Self {
            tier,
            used: AtomicU64::new(0),
            cap: AtomicU64::new(cap),
        }
    }

    pub fn tier(&self) -> MemoryTier {
        self.tier
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }

    pub fn cap(&self) -> u64 {
        self.cap.load(Ordering::Relaxed)
    }

    pub fn set_cap(&self, cap: u64) {
        self.cap.store(cap, Ordering::Relaxed);
    }

    fn try_reserve(&self, bytes: u64) -> bool {
        let cap = self.cap();
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|next| *next <= cap)
            })
            .is_ok()
    }

    fn try_release(&self, bytes: u64) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| used.checked_sub(bytes))
            .is_ok()
    }

    fn charge(&self, bytes: u64) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_add(bytes))
            });
    }
}

/// The three budgets one index draws from
#[derive(Debug)]
pub struct MemoryAccount {
    global: Arc<MemoryBudget>,
    namespace: Arc<MemoryBudget>,
    index: MemoryBudget,
}

impl MemoryAccount {
    pub fn new(global: Arc<MemoryBudget>, namespace: Arc<MemoryBudget>, index_cap: u64) -> Self {
        Self {
            global,
            namespace,
            index: MemoryBudget::new(MemoryTier::Index, index_cap),
        }
    }

    fn tiers(&self) -> [&MemoryBudget; 3] {
        [&*self.global, &*self.namespace, &self.index]
    }

    /// Reserve `bytes` in every tier, outermost first. On refusal the
    /// tiers already charged are rolled back.
    pub fn reserve(&self, bytes: u64) -> SindexResult<()> {
        if bytes == 0 {
            return Ok(());
        }
        let tiers = self.tiers();
        for (i, tier) in tiers.iter().enumerate() {
            if tier.try_reserve(bytes) {
                continue;
            }
            for charged in &tiers[..i] {
                charged.try_release(bytes);
            }
            let requested = bytes.to_string();
            log_event_with_fields(
                Event::SindexMemoryCap,
                &[("tier", tier.tier().as_str()), ("requested", &requested)],
            );
            return Err(SindexError::OutOfMemory {
                tier: tier.tier(),
                requested: bytes,
            });
        }
        Ok(())
    }

    /// Charge `bytes` without checking caps. Used when a store grew by more
    /// than it estimated.
    pub fn charge(&self, bytes: u64) {
        for tier in self.tiers() {
            tier.charge(bytes);
        }
    }

    /// Return `bytes` to every tier.
    ///
    /// Returns false, and changes nothing, if any tier holds less than
    /// `bytes`.
    pub fn release(&self, bytes: u64) -> bool {
        if bytes == 0 {
            return true;
        }
        let tiers = self.tiers();
        if let Some(short) = tiers.iter().find(|t| t.used() < bytes) {
            let used = short.used().to_string();
            let requested = bytes.to_string();
            log_event_with_fields(
                Event::SindexAccountingCorrupted,
                &[
                    ("tier", short.tier().as_str()),
                    ("used", &used),
                    ("released", &requested),
                ],
            );
            return false;
        }
        let mut clean = true;
        for tier in tiers {
            clean &= tier.try_release(bytes);
        }
        clean
    }

    /// Return everything this index still holds.
    pub fn release_all(&self) -> bool {
        self.release(self.index.used())
    }

    pub fn index_used(&self) -> u64 {
        self.index.used()
    }

    pub fn index_cap(&self) -> u64 {
        self.index.cap()
    }

    pub fn set_index_cap(&self, cap: u64) {
        self.index.set_cap(cap);
    }
}
