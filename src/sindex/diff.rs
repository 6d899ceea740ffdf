//! Incremental list diff
//!
//! When a list bin is rewritten with another list, only the keys that
//! appear on one side need index work. The shorter list S is hashed, the
//! longer list L is scanned against it: keys found in S are unchanged,
//! keys missing from S belong only to L, and whatever in S was never
//! matched belongs only to S.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use smallvec::SmallVec;

use super::definition::{IndexFlavor, KeyType};
use super::instance::IndexHandle;
use super::key::IndexKey;
use super::sbin::{scalar_key, KeySet, SBin, SbinOp};
use super::value::Value;

/// Net key changes between two lists
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KeyDiff {
    pub inserted: KeySet,
    pub deleted: KeySet,
}

impl KeyDiff {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Presence {
    /// From S, not yet seen in L
    Unmatched,
    /// From S and seen in L
    Matched,
    /// Only in L, already emitted
    Emitted,
}

/// Whether an index can take the diff path for list-to-list rewrites.
pub fn qualifies(index: &IndexHandle) -> bool {
    let def = index.definition();
    def.flavor == IndexFlavor::ListElements
        && index.path().is_bin_only()
        && matches!(def.key_type, KeyType::Integer | KeyType::String)
}

/// Diff two lists element-wise under `key_type`.
///
/// Elements that do not yield a key of `key_type` are ignored. Returns
/// `None` for key types the diff does not handle.
pub fn diff_keys(key_type: KeyType, old: &[Value], new: &[Value]) -> Option<KeyDiff> {
    if !matches!(key_type, KeyType::Integer | KeyType::String) {
        return None;
    }

    let old_is_short = old.len() < new.len();
    let (short, long) = if old_is_short { (old, new) } else { (new, old) };

    let mut only_long = KeySet::new();
    let mut only_short = KeySet::new();

    if short.is_empty() {
        only_long.extend(long.iter().filter_map(|v| scalar_key(key_type, v)));
    } else {
        let mut seen: HashMap<IndexKey, Presence> = HashMap::with_capacity(short.len());
        for key in short.iter().filter_map(|v| scalar_key(key_type, v)) {
            seen.insert(key, Presence::Unmatched);
        }

        for key in long.iter().filter_map(|v| scalar_key(key_type, v)) {
            match seen.entry(key) {
                Entry::Occupied(mut slot) => {
                    if *slot.get() == Presence::Unmatched {
                        slot.insert(Presence::Matched);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(Presence::Emitted);
                    only_long.push(key);
                }
            }
        }

        only_short.extend(
            seen.into_iter()
                .filter(|(_, presence)| *presence == Presence::Unmatched)
                .map(|(key, _)| key),
        );
    }

    let diff = if old_is_short {
        KeyDiff {
            inserted: only_long,
            deleted: only_short,
        }
    } else {
        KeyDiff {
            inserted: only_short,
            deleted: only_long,
        }
    };
    Some(diff)
}

/// Sbins for a list-to-list rewrite, or `None` when `index` must use the
/// full delete/insert path. Empty sbins are left out.
pub fn diff_sbins(
    index: &IndexHandle,
    old: &[Value],
    new: &[Value],
) -> Option<SmallVec<[SBin; 2]>> {
    if !qualifies(index) {
        return None;
    }
    let diff = diff_keys(index.definition().key_type, old, new)?;

    let mut sbins = SmallVec::new();
    if !diff.deleted.is_empty() {
        sbins.push(SBin::with_keys(index.clone(), SbinOp::Delete, diff.deleted));
    }
    if !diff.inserted.is_empty() {
        sbins.push(SBin::with_keys(index.clone(), SbinOp::Insert, diff.inserted));
    }
    Some(sbins)
}
