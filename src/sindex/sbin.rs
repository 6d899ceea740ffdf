//! Key-set collection ("sbin")
//!
//! An sbin is the batch of keys one mutation produces for one index,
//! tagged INSERT or DELETE. Keys live inline until a second key arrives;
//! after that the array grows on the heap, doubling from a capacity of 2.

use std::fmt;

use smallvec::SmallVec;

use super::definition::{BinPath, IndexFlavor, KeyType};
use super::errors::SindexResult;
use super::geo;
use super::instance::IndexHandle;
use super::key::{IndexKey, MAX_STRING_KEY_LEN};
use super::path;
use super::value::Value;
use crate::observability::{log_event_with_fields, Event};

/// Keys gathered for one index and one operation
pub type KeySet = SmallVec<[IndexKey; 1]>;

/// Operation an sbin applies to the index store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SbinOp {
    Insert,
    Delete,
}

impl SbinOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            SbinOp::Insert => "INSERT",
            SbinOp::Delete => "DELETE",
        }
    }

    pub fn opposite(&self) -> SbinOp {
        match self {
            SbinOp::Insert => SbinOp::Delete,
            SbinOp::Delete => SbinOp::Insert,
        }
    }
}

impl fmt::Display for SbinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Keys for one index, tagged with the operation to apply
pub struct SBin {
    index: IndexHandle,
    op: SbinOp,
    keys: KeySet,
}

impl SBin {
    pub fn new(index: IndexHandle, op: SbinOp) -> Self {
        Self::with_keys(index, op, KeySet::new())
    }

    pub fn with_keys(index: IndexHandle, op: SbinOp, keys: KeySet) -> Self {
        Self { index, op, keys }
    }

    /// Collect the keys `value` contributes to `index`.
    pub fn collect(index: &IndexHandle, op: SbinOp, value: &Value) -> SindexResult<SBin> {
        let def = index.definition();
        let keys = collect_keys(index.path(), def.flavor, def.key_type, value)?;
        Ok(Self::with_keys(index.clone(), op, keys))
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    pub fn op(&self) -> SbinOp {
        self.op
    }

    pub fn key_type(&self) -> KeyType {
        self.index.definition().key_type
    }

    pub fn keys(&self) -> &[IndexKey] {
        &self.keys
    }

    pub fn push(&mut self, key: IndexKey) {
        self.keys.push(key);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// True while the keys still fit the inline slot.
    pub fn is_inline(&self) -> bool {
        !self.keys.spilled()
    }
}

impl fmt::Debug for SBin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SBin")
            .field("index", &self.index.definition().name)
            .field("op", &self.op)
            .field("keys", &self.keys.len())
            .finish()
    }
}

/// Extract every key `value` yields for an index shaped by
/// `(path, flavor, key_type)`.
///
/// A path or type mismatch yields no keys. A default-flavor geo value that
/// does not parse is an error; inside containers such elements are skipped.
pub fn collect_keys(
    bin_path: &BinPath,
    flavor: IndexFlavor,
    key_type: KeyType,
    value: &Value,
) -> SindexResult<KeySet> {
    let mut keys = KeySet::new();
    let Some(target) = path::resolve(bin_path, flavor, key_type, value) else {
        return Ok(keys);
    };

    match flavor {
        IndexFlavor::Default => push_scalar(key_type, target, &mut keys)?,
        IndexFlavor::ListElements => {
            for element in target.as_list().unwrap_or_default() {
                push_element(bin_path, key_type, element, &mut keys);
            }
        }
        IndexFlavor::MapKeys => {
            for (k, _) in target.as_map().unwrap_or_default() {
                push_element(bin_path, key_type, k, &mut keys);
            }
        }
        IndexFlavor::MapValues => {
            for (_, v) in target.as_map().unwrap_or_default() {
                push_element(bin_path, key_type, v, &mut keys);
            }
        }
    }
    Ok(keys)
}

fn push_element(bin_path: &BinPath, key_type: KeyType, element: &Value, keys: &mut KeySet) {
    if !path::scalar_matches(key_type, element) {
        return;
    }
    if let Err(e) = push_scalar(key_type, element, keys) {
        log_event_with_fields(
            Event::SindexKeyRejected,
            &[("path", bin_path.as_str()), ("reason", &e.to_string())],
        );
    }
}

/// Integer or string key for a matching scalar. Geo values and strings
/// too long to index yield `None`.
pub(crate) fn scalar_key(key_type: KeyType, value: &Value) -> Option<IndexKey> {
    match (key_type, value) {
        (KeyType::Integer, Value::Integer(v)) => Some(IndexKey::from_int(*v)),
        (KeyType::String, Value::String(s)) if s.len() <= MAX_STRING_KEY_LEN => {
            Some(IndexKey::from_str_value(s))
        }
        _ => None,
    }
}

fn push_scalar(key_type: KeyType, value: &Value, keys: &mut KeySet) -> SindexResult<()> {
    match (key_type, value) {
        (KeyType::Geo, Value::GeoJson(doc)) => {
            let cells = geo::parse_geojson(doc)?;
            keys.extend(cells.cells().iter().copied().map(IndexKey::from_cell));
        }
        (KeyType::String, Value::String(s)) if s.len() > MAX_STRING_KEY_LEN => {
            let len = s.len().to_string();
            log_event_with_fields(
                Event::SindexKeyRejected,
                &[("reason", "string key too long"), ("len", &len)],
            );
        }
        _ => keys.extend(scalar_key(key_type, value)),
    }
    Ok(())
}
