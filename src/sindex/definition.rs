//! Index definitions and bin path parsing
//!
//! A bin path names the bin and, optionally, a route into nested
//! containers: `profile.tags[0]` reads map key `"tags"` of bin
//! `profile`, then element 0 of that list. A map key that parses fully
//! as an integer is an integer key.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::{SindexError, SindexResult};

/// Longest accepted index name, in bytes
pub const MAX_INDEX_NAME_LEN: usize = 31;

/// Longest accepted bin name, in bytes
pub const MAX_BIN_NAME_LEN: usize = 15;

/// Longest accepted bin path string, in bytes
pub const MAX_PATH_LEN: usize = 256;

/// Maximum number of steps below the bin
pub const MAX_PATH_DEPTH: usize = 10;

/// Declared type of the keys an index holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    #[serde(rename = "NUMERIC")]
    Integer,
    #[serde(rename = "STRING")]
    String,
    #[serde(rename = "GEO2DSPHERE")]
    Geo,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Integer => "NUMERIC",
            KeyType::String => "STRING",
            KeyType::Geo => "GEO2DSPHERE",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How an index fans keys out of the value its path resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IndexFlavor {
    #[default]
    #[serde(rename = "NONE")]
    Default,
    #[serde(rename = "LIST")]
    ListElements,
    #[serde(rename = "MAPKEYS")]
    MapKeys,
    #[serde(rename = "MAPVALUES")]
    MapValues,
}

impl IndexFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexFlavor::Default => "NONE",
            IndexFlavor::ListElements => "LIST",
            IndexFlavor::MapKeys => "MAPKEYS",
            IndexFlavor::MapValues => "MAPVALUES",
        }
    }
}

impl fmt::Display for IndexFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Map key used by a path step
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Int(i64),
    Str(String),
}

/// One step of a bin path below the bin itself
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    MapKey(MapKey),
    ListIndex(usize),
}

fn is_path_delimiter(c: char) -> bool {
    matches!(c, '.' | '[' | ']')
}

/// Parsed bin path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinPath {
    raw: String,
    bin: String,
    steps: Vec<PathStep>,
}

impl BinPath {
    /// Parse `bin ( '.' mapkey | '[' index ']' )*`.
    pub fn parse(raw: &str) -> SindexResult<Self> {
        if raw.len() > MAX_PATH_LEN {
            return Err(SindexError::invalid(format!(
                "bin path exceeds {} bytes",
                MAX_PATH_LEN
            )));
        }

        let bin_end = raw.find(is_path_delimiter).unwrap_or(raw.len());
        let bin = &raw[..bin_end];
        if bin.is_empty() || bin.len() > MAX_BIN_NAME_LEN {
            return Err(SindexError::invalid(format!(
                "bin name '{}' must be 1..={} bytes",
                bin, MAX_BIN_NAME_LEN
            )));
        }

        let mut steps = Vec::new();
        let mut rest = &raw[bin_end..];
        while !rest.is_empty() {
            if steps.len() >= MAX_PATH_DEPTH {
                return Err(SindexError::invalid(format!(
                    "bin path deeper than {} levels",
                    MAX_PATH_DEPTH
                )));
            }
            let (step, tail) = Self::parse_step(rest)?;
            steps.push(step);
            rest = tail;
        }

        Ok(Self {
            raw: raw.to_string(),
            bin: bin.to_string(),
            steps,
        })
    }

    fn parse_step(input: &str) -> SindexResult<(PathStep, &str)> {
        if let Some(body) = input.strip_prefix('.') {
            let end = body.find(is_path_delimiter).unwrap_or(body.len());
            let token = &body[..end];
            if token.is_empty() {
                return Err(SindexError::invalid("empty map key in bin path"));
            }
            let key = match token.parse::<i64>() {
                Ok(i) => MapKey::Int(i),
                Err(_) => MapKey::Str(token.to_string()),
            };
            return Ok((PathStep::MapKey(key), &body[end..]));
        }

        if let Some(body) = input.strip_prefix('[') {
            let end = body
                .find(']')
                .ok_or_else(|| SindexError::invalid("unterminated list index in bin path"))?;
            let index = body[..end].parse::<usize>().map_err(|_| {
                SindexError::invalid(format!("list index '{}' is not an integer", &body[..end]))
            })?;
            return Ok((PathStep::ListIndex(index), &body[end + 1..]));
        }

        Err(SindexError::invalid(format!(
            "unexpected '{}' in bin path",
            input.chars().next().unwrap_or(' ')
        )))
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the path is just the bin.
    pub fn is_bin_only(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Immutable description of a secondary index.
///
/// `set: None` is its own filter value: such an index only covers records
/// stored without a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub namespace: String,
    #[serde(default)]
    pub set: Option<String>,
    pub name: String,
    /// Bin path, e.g. `tags` or `profile.tags[0]`
    pub path: String,
    pub key_type: KeyType,
    #[serde(default)]
    pub flavor: IndexFlavor,
    /// Overrides the namespace partition count when set
    #[serde(default)]
    pub num_partitions: Option<u32>,
}

impl IndexDefinition {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
        key_type: KeyType,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            set: None,
            name: name.into(),
            path: path.into(),
            key_type,
            flavor: IndexFlavor::Default,
            num_partitions: None,
        }
    }

    pub fn with_set(mut self, set: impl Into<String>) -> Self {
        self.set = Some(set.into());
        self
    }

    pub fn with_flavor(mut self, flavor: IndexFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.num_partitions = Some(partitions);
        self
    }

    /// Validate names and parse the bin path.
    pub fn validate(&self) -> SindexResult<BinPath> {
        if self.name.is_empty() || self.name.len() > MAX_INDEX_NAME_LEN {
            return Err(SindexError::invalid(format!(
                "index name '{}' must be 1..={} bytes",
                self.name, MAX_INDEX_NAME_LEN
            )));
        }
        if self.namespace.is_empty() {
            return Err(SindexError::invalid("namespace must not be empty"));
        }
        if let Some(set) = &self.set {
            if set.is_empty() {
                return Err(SindexError::invalid("set name must not be empty"));
            }
        }
        BinPath::parse(&self.path)
    }

    /// Two definitions index the same thing when everything but the name
    /// and partitioning matches.
    pub fn same_definition(&self, other: &IndexDefinition) -> bool {
        self.namespace == other.namespace
            && self.set == other.set
            && self.path == other.path
            && self.key_type == other.key_type
            && self.flavor == other.flavor
    }

    /// Key used for per-index configuration and reconciliation: `ns:name`
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.namespace, self.name)
    }
}
