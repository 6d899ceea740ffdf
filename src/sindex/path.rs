//! Path extraction
//!
//! Walks a bin value along a `BinPath` and checks that the value found
//! there has the shape the index expects. A mismatch anywhere means the
//! bin does not contribute to that index; it is never an error.

use super::definition::{BinPath, IndexFlavor, KeyType, PathStep};
use super::value::Value;

/// Follow `steps` from `root`.
pub fn extract<'v>(root: &'v Value, steps: &[PathStep]) -> Option<&'v Value> {
    steps.iter().try_fold(root, |current, step| match (current, step) {
        (Value::List(items), PathStep::ListIndex(index)) => items.get(*index),
        (Value::Map(_), PathStep::MapKey(key)) => current.map_get(key),
        _ => None,
    })
}

/// Whether a resolved value has the terminal shape for this index.
pub fn accepts(flavor: IndexFlavor, key_type: KeyType, value: &Value) -> bool {
    match flavor {
        IndexFlavor::Default => scalar_matches(key_type, value),
        IndexFlavor::ListElements => matches!(value, Value::List(_)),
        IndexFlavor::MapKeys | IndexFlavor::MapValues => matches!(value, Value::Map(_)),
    }
}

/// True when a scalar's runtime type is exactly the declared key type.
pub fn scalar_matches(key_type: KeyType, value: &Value) -> bool {
    matches!(
        (key_type, value),
        (KeyType::Integer, Value::Integer(_))
            | (KeyType::String, Value::String(_))
            | (KeyType::Geo, Value::GeoJson(_))
    )
}

/// Extract and check in one go.
pub fn resolve<'v>(
    path: &BinPath,
    flavor: IndexFlavor,
    key_type: KeyType,
    root: &'v Value,
) -> Option<&'v Value> {
    extract(root, path.steps()).filter(|v| accepts(flavor, key_type, v))
}
