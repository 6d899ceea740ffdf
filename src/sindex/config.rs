//! Engine, namespace and per-index configuration
//!
//! Boot configuration is a JSON document:
//!
//! ```json
//! {
//!   "data_max_memory": 1073741824,
//!   "namespaces": [
//!     { "name": "test", "num_partitions": 32,
//!       "indexes": [ { "name": "idx_age", "gc_period": 500 } ] }
//!   ]
//! }
//! ```
//!
//! Omitted fields take their defaults; memory caps default to unlimited.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::definition::MAX_INDEX_NAME_LEN;
use super::errors::{SindexError, SindexResult};
use crate::observability::{log_event_with_fields, Event};

/// Memory cap meaning "no limit"
pub const UNLIMITED: u64 = u64::MAX;

pub const DEFAULT_PARTITIONS: u32 = 32;
pub const MIN_PARTITIONS: u32 = 1;
pub const MAX_PARTITIONS: u32 = 256;

/// Indexes allowed per namespace
pub const MAX_INDEXES: usize = 256;

pub const DEFAULT_GC_PERIOD: u64 = 1000;
pub const DEFAULT_GC_MAX_UNITS: u64 = 1000;

/// Runtime-adjustable settings of one index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Memory cap for this index
    pub data_max_memory: u64,
    /// Background maintenance period, milliseconds
    pub gc_period: u64,
    /// Units processed per maintenance pass
    pub gc_max_units: u64,
    /// Serve reads while desynced
    pub ignore_not_sync: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            data_max_memory: UNLIMITED,
            gc_period: DEFAULT_GC_PERIOD,
            gc_max_units: DEFAULT_GC_MAX_UNITS,
            ignore_not_sync: false,
        }
    }
}

impl IndexConfig {
    /// Apply one `param=value` setting.
    ///
    /// `memory_used` is what the index currently holds; the memory cap
    /// cannot drop below it, nor below half the current cap.
    pub fn set_param(&mut self, param: &str, value: &str, memory_used: u64) -> SindexResult<()> {
        match param {
            "ignore-not-sync" => {
                self.ignore_not_sync = match value {
                    "true" | "yes" => true,
                    "false" | "no" => false,
                    _ => {
                        return Err(SindexError::invalid(format!(
                            "ignore-not-sync expects true|yes|false|no, got '{}'",
                            value
                        )))
                    }
                };
            }
            "data-max-memory" => {
                let cap = parse_u64(param, value)?;
                if self.data_max_memory != UNLIMITED && cap < self.data_max_memory / 2 {
                    return Err(SindexError::invalid(format!(
                        "data-max-memory {} is below half the current cap {}",
                        cap, self.data_max_memory
                    )));
                }
                if cap < memory_used {
                    return Err(SindexError::invalid(format!(
                        "data-max-memory {} is below memory in use {}",
                        cap, memory_used
                    )));
                }
                self.data_max_memory = cap;
            }
            "gc-period" => self.gc_period = parse_u64(param, value)?,
            "gc-max-units" => self.gc_max_units = parse_u64(param, value)?,
            other => {
                return Err(SindexError::invalid(format!(
                    "unknown index parameter '{}'",
                    other
                )))
            }
        }
        Ok(())
    }
}

fn parse_u64(param: &str, value: &str) -> SindexResult<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        SindexError::invalid(format!("{} expects a non-negative integer, got '{}'", param, value))
    })
}

/// Boot-time settings for one named index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfigOverride {
    pub name: String,
    #[serde(flatten)]
    pub config: IndexConfig,
}

/// Settings of one namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    pub name: String,
    /// Memory cap across all indexes of the namespace
    pub data_max_memory: u64,
    /// Partitions per index unless the definition says otherwise
    pub num_partitions: u32,
    pub max_indexes: usize,
    pub indexes: Vec<IndexConfigOverride>,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            data_max_memory: UNLIMITED,
            num_partitions: DEFAULT_PARTITIONS,
            max_indexes: MAX_INDEXES,
            indexes: Vec::new(),
        }
    }
}

impl NamespaceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_memory_cap(mut self, bytes: u64) -> Self {
        self.data_max_memory = bytes;
        self
    }

    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.num_partitions = partitions;
        self
    }

    pub fn with_max_indexes(mut self, max: usize) -> Self {
        self.max_indexes = max;
        self
    }

    pub fn with_index_override(mut self, name: impl Into<String>, config: IndexConfig) -> Self {
        self.indexes.push(IndexConfigOverride {
            name: name.into(),
            config,
        });
        self
    }

    /// Boot-time settings for `index`, if any
    pub fn override_for(&self, index: &str) -> Option<&IndexConfig> {
        self.indexes.iter().find(|o| o.name == index).map(|o| &o.config)
    }

    pub fn validate(&self) -> SindexResult<()> {
        if self.name.is_empty() {
            return Err(SindexError::invalid("namespace name must not be empty"));
        }
        validate_partitions(self.num_partitions)?;
        if self.max_indexes == 0 || self.max_indexes > MAX_INDEXES {
            return Err(SindexError::invalid(format!(
                "max_indexes must be 1..={}",
                MAX_INDEXES
            )));
        }

        let mut seen = HashSet::new();
        for o in &self.indexes {
            if o.name.is_empty() || o.name.len() > MAX_INDEX_NAME_LEN {
                return Err(SindexError::invalid(format!(
                    "index override name '{}' must be 1..={} bytes",
                    o.name, MAX_INDEX_NAME_LEN
                )));
            }
            if !seen.insert(o.name.as_str()) {
                return Err(SindexError::invalid(format!(
                    "duplicate index override '{}' in namespace {}",
                    o.name, self.name
                )));
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_partitions(partitions: u32) -> SindexResult<()> {
    if !(MIN_PARTITIONS..=MAX_PARTITIONS).contains(&partitions) {
        return Err(SindexError::invalid(format!(
            "num_partitions must be {}..={}, got {}",
            MIN_PARTITIONS, MAX_PARTITIONS, partitions
        )));
    }
    Ok(())
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Memory cap across every namespace
    pub data_max_memory: u64,
    pub namespaces: Vec<NamespaceConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_max_memory: UNLIMITED,
            namespaces: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn with_namespace(mut self, namespace: NamespaceConfig) -> Self {
        self.namespaces.push(namespace);
        self
    }

    pub fn with_memory_cap(mut self, bytes: u64) -> Self {
        self.data_max_memory = bytes;
        self
    }

    pub fn validate(&self) -> SindexResult<()> {
        let mut seen = HashSet::new();
        for ns in &self.namespaces {
            ns.validate()?;
            if !seen.insert(ns.name.as_str()) {
                return Err(SindexError::invalid(format!(
                    "namespace '{}' configured twice",
                    ns.name
                )));
            }
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> SindexResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| SindexError::invalid(format!("malformed engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn load(path: &Path) -> SindexResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            SindexError::invalid(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json_str(&contents)?;

        let path_str = path.display().to_string();
        let namespaces = config.namespaces.len().to_string();
        log_event_with_fields(
            Event::ConfigLoaded,
            &[("path", &path_str), ("namespaces", &namespaces)],
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_config_defaults() {
        let config = IndexConfig::default();
        assert_eq!(config.data_max_memory, UNLIMITED);
        assert_eq!(config.gc_period, 1000);
        assert_eq!(config.gc_max_units, 1000);
        assert!(!config.ignore_not_sync);
    }

    #[test]
    fn test_set_ignore_not_sync() {
        let mut config = IndexConfig::default();
        config.set_param("ignore-not-sync", "yes", 0).unwrap();
        assert!(config.ignore_not_sync);
        config.set_param("ignore-not-sync", "false", 0).unwrap();
        assert!(!config.ignore_not_sync);
        assert!(config.set_param("ignore-not-sync", "maybe", 0).is_err());
    }

    #[test]
    fn test_set_data_max_memory_rules() {
        let mut config = IndexConfig::default();
        // from unlimited anything at or above usage is accepted
        config.set_param("data-max-memory", "1000", 10).unwrap();
        assert_eq!(config.data_max_memory, 1000);

        // below half the current cap
        assert!(config.set_param("data-max-memory", "499", 0).is_err());
        // below usage
        assert!(config.set_param("data-max-memory", "600", 700).is_err());

        config.set_param("data-max-memory", "500", 100).unwrap();
        assert_eq!(config.data_max_memory, 500);
    }

    #[test]
    fn test_set_gc_params_and_unknown() {
        let mut config = IndexConfig::default();
        config.set_param("gc-period", "250", 0).unwrap();
        config.set_param("gc-max-units", "10", 0).unwrap();
        assert_eq!(config.gc_period, 250);
        assert_eq!(config.gc_max_units, 10);

        assert!(config.set_param("gc-period", "-1", 0).is_err());
        assert!(matches!(
            config.set_param("histogram", "true", 0),
            Err(SindexError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_namespace_validation() {
        assert!(NamespaceConfig::new("test").validate().is_ok());
        assert!(NamespaceConfig::new("").validate().is_err());
        assert!(NamespaceConfig::new("test").with_partitions(0).validate().is_err());
        assert!(NamespaceConfig::new("test").with_partitions(257).validate().is_err());
        assert!(NamespaceConfig::new("test").with_max_indexes(0).validate().is_err());

        let dup = NamespaceConfig::new("test")
            .with_index_override("a", IndexConfig::default())
            .with_index_override("a", IndexConfig::default());
        assert!(dup.validate().is_err());
    }

    #[test]
    fn test_engine_config_from_json() {
        let json = r#"{
            "data_max_memory": 4096,
            "namespaces": [
                { "name": "test", "num_partitions": 8,
                  "indexes": [ { "name": "idx_age", "gc_period": 500 } ] }
            ]
        }"#;
        let config = EngineConfig::from_json_str(json).unwrap();
        assert_eq!(config.data_max_memory, 4096);

        let ns = &config.namespaces[0];
        assert_eq!(ns.num_partitions, 8);
        assert_eq!(ns.data_max_memory, UNLIMITED);
        let o = ns.override_for("idx_age").unwrap();
        assert_eq!(o.gc_period, 500);
        assert_eq!(o.gc_max_units, DEFAULT_GC_MAX_UNITS);
        assert!(ns.override_for("other").is_none());
    }

    #[test]
    fn test_engine_config_rejects_duplicate_namespace() {
        let json = r#"{ "namespaces": [ { "name": "a" }, { "name": "a" } ] }"#;
        assert!(EngineConfig::from_json_str(json).is_err());
        assert!(EngineConfig::from_json_str("{").is_err());
    }
}
