//! Observable secondary index events

use std::fmt;

use super::logger::Severity;

/// Lifecycle and maintenance events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Engine configuration loaded
    ConfigLoaded,
    /// Boot-time index stanza never matched a created index
    ConfigOverrideUnused,

    // Lifecycle
    /// Index created and registered
    SindexCreate,
    /// Index creation refused
    SindexCreateFailed,
    /// Index flipped to destroyed
    SindexDestroy,
    /// Last reference dropped, memory returned
    SindexReclaim,
    /// Runtime configuration changed
    SindexConfigChange,

    // Maintenance
    /// Population scan begins
    SindexPopulateBegin,
    /// Population scan complete, index readable
    SindexPopulateComplete,
    /// Population scan failed, index left write-only
    SindexPopulateFailed,
    /// Desynced index repopulated
    SindexRepair,
    /// All entries of a set removed
    SindexSetEmptied,
    /// Authoritative definitions applied
    SindexReconcile,

    // Faults
    /// Reservation refused by a memory tier
    SindexMemoryCap,
    /// Bin value could not be turned into keys
    SindexKeyRejected,
    /// Release larger than what a tier holds
    SindexAccountingCorrupted,
    /// Internal invariant violated
    SindexAssertion,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::ConfigOverrideUnused => "CONFIG_OVERRIDE_UNUSED",

            Event::SindexCreate => "SINDEX_CREATE",
            Event::SindexCreateFailed => "SINDEX_CREATE_FAILED",
            Event::SindexDestroy => "SINDEX_DESTROY",
            Event::SindexReclaim => "SINDEX_RECLAIM",
            Event::SindexConfigChange => "SINDEX_CONFIG_CHANGE",

            Event::SindexPopulateBegin => "SINDEX_POPULATE_BEGIN",
            Event::SindexPopulateComplete => "SINDEX_POPULATE_COMPLETE",
            Event::SindexPopulateFailed => "SINDEX_POPULATE_FAILED",
            Event::SindexRepair => "SINDEX_REPAIR",
            Event::SindexSetEmptied => "SINDEX_SET_EMPTIED",
            Event::SindexReconcile => "SINDEX_RECONCILE",

            Event::SindexMemoryCap => "SINDEX_MEMORY_CAP",
            Event::SindexKeyRejected => "SINDEX_KEY_REJECTED",
            Event::SindexAccountingCorrupted => "SINDEX_ACCOUNTING_CORRUPTED",
            Event::SindexAssertion => "SINDEX_ASSERTION",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::SindexAccountingCorrupted | Event::SindexAssertion => Severity::Error,
            Event::SindexCreateFailed
            | Event::SindexMemoryCap
            | Event::SindexPopulateFailed
            | Event::SindexKeyRejected
            | Event::ConfigOverrideUnused => Severity::Warn,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
