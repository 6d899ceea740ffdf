//! Mutation Applier Tests
//!
//! Tests for write-path invariants:
//! - Bin changes become the right DELETE and INSERT keys
//! - Every DELETE of a mutation lands before any INSERT
//! - Memory refusals mark the index desynced, repair recovers it

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use aerodb_sindex::sindex::geo::point_cell;
use aerodb_sindex::sindex::{
    build_sbins, BTreeShard, DeleteOutcome, IndexConfig, IndexDefinition, IndexFlavor,
    IndexHandle, IndexKey, InsertOutcome, KeyType, LookupMode, MemoryBudget, MemoryTier,
    NamespaceConfig, NamespaceIndexes, RecordKey, RecordScan, SbinOp, ScannedRecord, ShardStore,
    SindexError, SindexResult, StoreFactory, StoreResult, Value, BTreeShardFactory,
    SHARD_BASE_BYTES, UNLIMITED,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn namespace_with(config: NamespaceConfig, factory: Arc<dyn StoreFactory>) -> NamespaceIndexes {
    NamespaceIndexes::new(
        config,
        Arc::new(MemoryBudget::new(MemoryTier::Global, UNLIMITED)),
        factory,
    )
    .unwrap()
}

fn namespace() -> NamespaceIndexes {
    namespace_with(
        NamespaceConfig::new("test").with_partitions(4),
        Arc::new(BTreeShardFactory),
    )
}

fn handle(ns: &NamespaceIndexes, name: &str) -> IndexHandle {
    ns.registry()
        .lookup_by_name(name, LookupMode::ActiveOnly)
        .unwrap()
}

fn strs(items: &[&str]) -> Value {
    Value::from(items.to_vec())
}

fn key_set(keys: &[IndexKey]) -> BTreeSet<IndexKey> {
    keys.iter().copied().collect()
}

/// Scan over a fixed list of records
struct VecScan {
    records: Vec<ScannedRecord>,
    pos: usize,
}

impl VecScan {
    fn new(records: Vec<ScannedRecord>) -> Self {
        Self { records, pos: 0 }
    }
}

impl RecordScan for VecScan {
    fn scan_next(&mut self) -> SindexResult<Option<ScannedRecord>> {
        let next = self.records.get(self.pos).cloned();
        self.pos += 1;
        Ok(next)
    }

    fn reset(&mut self) -> SindexResult<()> {
        self.pos = 0;
        Ok(())
    }
}

/// Scan that queries the index it is filling before each record
struct ReadingScan<'a> {
    ns: &'a NamespaceIndexes,
    index: &'a str,
    inner: VecScan,
    reads: Vec<bool>,
}

impl RecordScan for ReadingScan<'_> {
    fn scan_next(&mut self) -> SindexResult<Option<ScannedRecord>> {
        self.reads.push(self.ns.reserve_for_read(self.index).is_ok());
        self.inner.scan_next()
    }

    fn reset(&mut self) -> SindexResult<()> {
        self.inner.reset()
    }
}

/// Scan that fails after yielding `good` records
struct FailingScan {
    inner: VecScan,
    good: usize,
}

impl RecordScan for FailingScan {
    fn scan_next(&mut self) -> SindexResult<Option<ScannedRecord>> {
        if self.inner.pos >= self.good {
            return Err(SindexError::InvalidParameter("corrupt record".to_string()));
        }
        self.inner.scan_next()
    }

    fn reset(&mut self) -> SindexResult<()> {
        self.inner.reset()
    }
}

fn scanned(user_key: &str, set: Option<&str>, bin: &str, value: Value) -> ScannedRecord {
    ScannedRecord {
        record: RecordKey::from_user_key(user_key),
        set: set.map(str::to_string),
        bins: vec![(bin.to_string(), value)],
    }
}

/// Shard that logs every store operation, tagged with its index name
struct RecordingShard {
    index: String,
    inner: BTreeShard,
    log: Arc<Mutex<Vec<String>>>,
}

fn describe(key: &IndexKey) -> String {
    match key {
        IndexKey::Integer(v) => v.to_string(),
        other => other.to_string(),
    }
}

impl ShardStore for RecordingShard {
    fn insert(&mut self, key: IndexKey, record: RecordKey) -> StoreResult<InsertOutcome> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{} insert {}", self.index, describe(&key)));
        self.inner.insert(key, record)
    }

    fn delete(&mut self, key: &IndexKey, record: &RecordKey) -> StoreResult<DeleteOutcome> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{} delete {}", self.index, describe(key)));
        self.inner.delete(key, record)
    }

    fn lookup_eq(&self, key: &IndexKey) -> Vec<RecordKey> {
        self.inner.lookup_eq(key)
    }

    fn range_query(&self, min: Option<&IndexKey>, max: Option<&IndexKey>) -> Vec<RecordKey> {
        self.inner.range_query(min, max)
    }

    fn insert_cost(&self, key: &IndexKey) -> u64 {
        self.inner.insert_cost(key)
    }

    fn key_count(&self) -> u64 {
        self.inner.key_count()
    }

    fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    fn memory_size(&self) -> u64 {
        self.inner.memory_size()
    }

    fn clear(&mut self) {
        self.inner.clear()
    }
}

struct RecordingFactory {
    log: Arc<Mutex<Vec<String>>>,
}

impl StoreFactory for RecordingFactory {
    fn create_shard(&self, definition: &IndexDefinition, _partition: usize) -> Box<dyn ShardStore> {
        Box::new(RecordingShard {
            index: definition.name.clone(),
            inner: BTreeShard::new(),
            log: Arc::clone(&self.log),
        })
    }
}

// =============================================================================
// Sbin Construction Tests
// =============================================================================

/// A list rewrite on a list index emits only the net change.
#[test]
fn test_list_rewrite_emits_net_change() {
    let ns = namespace();
    ns.create(
        IndexDefinition::new("test", "idx_tags", "tags", KeyType::String)
            .with_flavor(IndexFlavor::ListElements),
    )
    .unwrap();
    let index = handle(&ns, "idx_tags");

    let old = strs(&["a", "b", "c"]);
    let new = strs(&["b", "c", "d"]);
    let mut sbins = Vec::new();
    build_sbins(&index, Some(&old), Some(&new), &mut sbins);

    assert_eq!(sbins.len(), 2);
    assert_eq!(sbins[0].op(), SbinOp::Delete);
    assert_eq!(sbins[0].keys(), &[IndexKey::from_str_value("a")]);
    assert_eq!(sbins[1].op(), SbinOp::Insert);
    assert_eq!(sbins[1].keys(), &[IndexKey::from_str_value("d")]);
}

/// An unchanged list emits nothing.
#[test]
fn test_list_rewrite_unchanged() {
    let ns = namespace();
    ns.create(
        IndexDefinition::new("test", "idx_tags", "tags", KeyType::String)
            .with_flavor(IndexFlavor::ListElements),
    )
    .unwrap();
    let index = handle(&ns, "idx_tags");

    let value = strs(&["x", "y"]);
    let mut sbins = Vec::new();
    build_sbins(&index, Some(&value), Some(&value), &mut sbins);
    assert!(sbins.is_empty());
}

/// A bin appearing yields a single INSERT.
#[test]
fn test_new_bin_single_insert() {
    let ns = namespace();
    ns.create(IndexDefinition::new("test", "idx_age", "age", KeyType::Integer))
        .unwrap();
    let index = handle(&ns, "idx_age");

    let mut sbins = Vec::new();
    build_sbins(&index, None, Some(&Value::from(42)), &mut sbins);

    assert_eq!(sbins.len(), 1);
    assert_eq!(sbins[0].op(), SbinOp::Insert);
    assert_eq!(sbins[0].keys(), &[IndexKey::from_int(42)]);
}

/// A value of the wrong type yields no keys.
#[test]
fn test_type_mismatch_ignored() {
    let ns = namespace();
    ns.create(IndexDefinition::new("test", "idx_age", "age", KeyType::Integer))
        .unwrap();
    let index = handle(&ns, "idx_age");

    let mut sbins = Vec::new();
    build_sbins(&index, Some(&Value::from("old")), Some(&Value::from(1.5)), &mut sbins);
    assert!(sbins.is_empty());
}

/// A list index on a nested path takes the full delete/insert path.
#[test]
fn test_nested_list_path_uses_full_path() {
    let ns = namespace();
    ns.create(
        IndexDefinition::new("test", "idx_nested", "doc.tags", KeyType::String)
            .with_flavor(IndexFlavor::ListElements),
    )
    .unwrap();
    let index = handle(&ns, "idx_nested");

    let old = Value::map([("tags", strs(&["a", "b"]))]);
    let new = Value::map([("tags", strs(&["b", "c"]))]);
    let mut sbins = Vec::new();
    build_sbins(&index, Some(&old), Some(&new), &mut sbins);

    assert_eq!(sbins.len(), 2);
    assert_eq!(sbins[0].op(), SbinOp::Delete);
    assert_eq!(
        key_set(sbins[0].keys()),
        key_set(&[IndexKey::from_str_value("a"), IndexKey::from_str_value("b")])
    );
    assert_eq!(sbins[1].op(), SbinOp::Insert);
    assert_eq!(
        key_set(sbins[1].keys()),
        key_set(&[IndexKey::from_str_value("b"), IndexKey::from_str_value("c")])
    );
}

// =============================================================================
// Apply Tests
// =============================================================================

/// Writes keep lookups in step with the record's current value.
#[test]
fn test_on_bin_change_updates_lookups() {
    let ns = namespace();
    ns.create(
        IndexDefinition::new("test", "idx_tags", "tags", KeyType::String)
            .with_flavor(IndexFlavor::ListElements),
    )
    .unwrap();
    let record = RecordKey::from_user_key("user-1");

    let first = strs(&["a", "b", "c"]);
    let outcome = ns.on_bin_change(None, "tags", None, Some(&first), &record);
    assert_eq!(outcome.indexes, 1);
    assert_eq!(outcome.inserted, 3);

    let second = strs(&["b", "c", "d"]);
    let outcome = ns.on_bin_change(None, "tags", Some(&first), Some(&second), &record);
    assert_eq!((outcome.deleted, outcome.inserted), (1, 1));

    let index = handle(&ns, "idx_tags");
    assert!(index.lookup_eq(&IndexKey::from_str_value("a")).is_empty());
    assert_eq!(index.lookup_eq(&IndexKey::from_str_value("d")), vec![record]);
    assert_eq!(index.stats().objects(), 3);

    let outcome = ns.on_bin_change(None, "tags", Some(&second), None, &record);
    assert_eq!(outcome.deleted, 3);
    assert_eq!(index.stats().objects(), 0);
    assert_eq!(ns.memory_used(), 4 * SHARD_BASE_BYTES);
}

/// Writes to an unindexed bin touch nothing.
#[test]
fn test_unindexed_bin() {
    let ns = namespace();
    ns.create(IndexDefinition::new("test", "idx_age", "age", KeyType::Integer))
        .unwrap();
    let record = RecordKey::from_user_key("r");
    let outcome = ns.on_bin_change(None, "name", None, Some(&Value::from("x")), &record);
    assert_eq!(outcome.indexes, 0);
}

/// Set filters are exact; no set is its own filter.
#[test]
fn test_set_filter() {
    let ns = namespace();
    ns.create(
        IndexDefinition::new("test", "idx_user_age", "age", KeyType::Integer).with_set("users"),
    )
    .unwrap();
    let record = RecordKey::from_user_key("r");
    let value = Value::from(7);

    assert_eq!(ns.on_bin_change(Some("users"), "age", None, Some(&value), &record).inserted, 1);
    assert_eq!(ns.on_bin_change(Some("orders"), "age", None, Some(&value), &record).indexes, 0);
    assert_eq!(ns.on_bin_change(None, "age", None, Some(&value), &record).indexes, 0);
}

/// An empty set name is a set name, not the no-set filter.
#[test]
fn test_empty_set_name_matches_nothing() {
    let ns = namespace();
    ns.create(IndexDefinition::new("test", "idx_age", "age", KeyType::Integer))
        .unwrap();
    let record = RecordKey::from_user_key("r");
    let value = Value::from(7);

    assert_eq!(ns.on_bin_change(Some(""), "age", None, Some(&value), &record).indexes, 0);
    assert!(handle(&ns, "idx_age").lookup_eq(&IndexKey::from_int(7)).is_empty());
    assert_eq!(ns.on_bin_change(None, "age", None, Some(&value), &record).inserted, 1);
}

/// All deletes of a mutation land before any insert, across indexes.
#[test]
fn test_deletes_before_inserts() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let ns = namespace_with(
        NamespaceConfig::new("test").with_partitions(2),
        Arc::new(RecordingFactory { log: Arc::clone(&log) }),
    );
    ns.create(IndexDefinition::new("test", "idx_scalar", "v", KeyType::Integer))
        .unwrap();
    ns.create(
        IndexDefinition::new("test", "idx_list", "v", KeyType::Integer)
            .with_flavor(IndexFlavor::ListElements),
    )
    .unwrap();

    let record = RecordKey::from_user_key("r");
    ns.on_bin_change(None, "v", None, Some(&Value::from(vec![5, 6])), &record);
    log.lock().unwrap().clear();

    ns.on_bin_change(None, "v", Some(&Value::from(vec![5, 6])), Some(&Value::from(1)), &record);
    ns.on_bin_change(None, "v", Some(&Value::from(1)), Some(&Value::from(vec![2])), &record);

    let ops = log.lock().unwrap().clone();
    assert_eq!(ops.len(), 5);
    assert!(ops[..2].iter().all(|op| op.starts_with("idx_list delete")));
    assert_eq!(ops[2], "idx_scalar insert 1");
    assert_eq!(ops[3], "idx_scalar delete 1");
    assert_eq!(ops[4], "idx_list insert 2");
}

/// Map flavors index keys or values of the map at the path.
#[test]
fn test_map_flavors() {
    let ns = namespace();
    ns.create(
        IndexDefinition::new("test", "idx_attr_keys", "attrs", KeyType::String)
            .with_flavor(IndexFlavor::MapKeys),
    )
    .unwrap();
    ns.create(
        IndexDefinition::new("test", "idx_attr_vals", "attrs", KeyType::String)
            .with_flavor(IndexFlavor::MapValues),
    )
    .unwrap();

    let record = RecordKey::from_user_key("r");
    let attrs = Value::map([("color", "red"), ("size", "xl")]);
    let outcome = ns.on_bin_change(None, "attrs", None, Some(&attrs), &record);
    assert_eq!(outcome.indexes, 2);
    assert_eq!(outcome.inserted, 4);

    let keys = handle(&ns, "idx_attr_keys");
    assert_eq!(keys.lookup_eq(&IndexKey::from_str_value("color")), vec![record]);
    let vals = handle(&ns, "idx_attr_vals");
    assert_eq!(vals.lookup_eq(&IndexKey::from_str_value("xl")), vec![record]);
}

/// Geo points index under their cell; broken documents index nothing.
#[test]
fn test_geo_point() {
    let ns = namespace();
    ns.create(IndexDefinition::new("test", "idx_loc", "loc", KeyType::Geo))
        .unwrap();
    let record = RecordKey::from_user_key("r");

    let point = Value::geo(r#"{"type":"Point","coordinates":[-122.0,37.5]}"#);
    let outcome = ns.on_bin_change(None, "loc", None, Some(&point), &record);
    assert_eq!(outcome.inserted, 1);
    let index = handle(&ns, "idx_loc");
    assert_eq!(
        index.lookup_eq(&IndexKey::from_cell(point_cell(-122.0, 37.5))),
        vec![record]
    );

    let broken = Value::geo("not json");
    let other = RecordKey::from_user_key("other");
    let outcome = ns.on_bin_change(None, "loc", None, Some(&broken), &other);
    assert_eq!(outcome.inserted, 0);
}

/// A geo value holding both a point and a region is a failed write that
/// leaves the index desynced.
#[test]
fn test_ambiguous_geo_counted_as_failure() {
    let ns = namespace();
    ns.create(IndexDefinition::new("test", "idx_loc", "loc", KeyType::Geo))
        .unwrap();
    let record = RecordKey::from_user_key("r");

    let both = Value::geo(
        r#"{"type":"GeometryCollection","geometries":[
            {"type":"Point","coordinates":[1.0,1.0]},
            {"type":"AeroCircle","coordinates":[[0.0,0.0],10.0]}
        ]}"#,
    );
    let outcome = ns.on_bin_change(None, "loc", None, Some(&both), &record);
    assert_eq!(outcome.indexes, 1);
    assert_eq!(outcome.inserted, 0);
    assert_eq!(outcome.failed, 1);

    let stats = ns.stats("idx_loc").unwrap();
    assert_eq!(stats.counters.writes, 1);
    assert_eq!(stats.counters.write_errors, 1);
    assert_eq!(stats.counters.objects, 0);
    assert_eq!(stats.desync, 1);

    // removing it again fails the same way, without a second desync
    let outcome = ns.on_bin_change(None, "loc", Some(&both), None, &record);
    assert_eq!(outcome.failed, 1);
    let stats = ns.stats("idx_loc").unwrap();
    assert_eq!(stats.counters.delete_errors, 1);
    assert_eq!(stats.desync, 1);
}

/// Range lookups span partitions and come back sorted.
#[test]
fn test_range_lookup() {
    let ns = namespace();
    ns.create(IndexDefinition::new("test", "idx_age", "age", KeyType::Integer))
        .unwrap();
    let mut expected = Vec::new();
    for age in 0..20 {
        let record = RecordKey::from_user_key(&format!("user-{}", age));
        ns.on_bin_change(None, "age", None, Some(&Value::from(age)), &record);
        if (5..=9).contains(&age) {
            expected.push(record);
        }
    }
    expected.sort();

    let index = handle(&ns, "idx_age");
    let found = index.lookup_range(Some(&IndexKey::from_int(5)), Some(&IndexKey::from_int(9)));
    assert_eq!(found, expected);
    assert!(index
        .lookup_range(Some(&IndexKey::from_int(9)), Some(&IndexKey::from_int(5)))
        .is_empty());
}

// =============================================================================
// Memory And Desync Tests
// =============================================================================

/// A refused insert marks desync; repair rebuilds once memory allows.
#[test]
fn test_memory_cap_desync_and_repair() {
    let capped = IndexConfig {
        data_max_memory: 132,
        ..IndexConfig::default()
    };
    let ns = namespace_with(
        NamespaceConfig::new("test")
            .with_partitions(1)
            .with_index_override("idx_age", capped),
        Arc::new(BTreeShardFactory),
    );
    ns.create(IndexDefinition::new("test", "idx_age", "age", KeyType::Integer))
        .unwrap();

    let mut scan = VecScan::new(vec![
        scanned("a", None, "age", Value::from(1)),
        scanned("b", None, "age", Value::from(2)),
    ]);
    ns.populate("idx_age", &mut VecScan::new(Vec::new())).unwrap();

    let first = ns.on_bin_change(None, "age", None, Some(&Value::from(1)), &RecordKey::from_user_key("a"));
    assert_eq!(first.inserted, 1);
    let second = ns.on_bin_change(None, "age", None, Some(&Value::from(2)), &RecordKey::from_user_key("b"));
    assert_eq!(second.failed, 1);

    let stats = ns.stats("idx_age").unwrap();
    assert_eq!(stats.desync, 1);
    assert_eq!(stats.sync_state, "needsync");
    assert_eq!(stats.counters.write_errors, 1);
    assert!(matches!(
        ns.reserve_for_read("idx_age"),
        Err(SindexError::NotReadable(_))
    ));

    ns.set_config("idx_age", "ignore-not-sync", "yes").unwrap();
    assert!(ns.reserve_for_read("idx_age").is_ok());
    ns.set_config("idx_age", "ignore-not-sync", "no").unwrap();

    let err = ns.set_config("idx_age", "data-max-memory", "10").unwrap_err();
    assert!(matches!(err, SindexError::InvalidParameter(_)));
    ns.set_config("idx_age", "data-max-memory", "1024").unwrap();

    assert!(ns.repair("idx_age", &mut scan).unwrap());
    let stats = ns.stats("idx_age").unwrap();
    assert_eq!(stats.desync, 0);
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.counters.objects, 2);
    assert!(ns.reserve_for_read("idx_age").is_ok());

    assert!(!ns.repair("idx_age", &mut scan).unwrap());
}

/// Reads are refused for the whole of a repair, even when desync is
/// tolerated.
#[test]
fn test_repair_refuses_reads_until_rebuilt() {
    let ns = namespace();
    ns.create(IndexDefinition::new("test", "idx_age", "age", KeyType::Integer))
        .unwrap();
    ns.populate("idx_age", &mut VecScan::new(Vec::new())).unwrap();
    ns.mark_desync("idx_age").unwrap();

    let mut scan = ReadingScan {
        ns: &ns,
        index: "idx_age",
        inner: VecScan::new(vec![
            scanned("a", None, "age", Value::from(1)),
            scanned("b", None, "age", Value::from(2)),
        ]),
        reads: Vec::new(),
    };
    ns.set_config("idx_age", "ignore-not-sync", "yes").unwrap();
    assert!(ns.repair("idx_age", &mut scan).unwrap());

    assert_eq!(scan.reads, vec![false, false, false]);
    let stats = ns.stats("idx_age").unwrap();
    assert_eq!(stats.desync, 0);
    assert_eq!(stats.entries, 2);
    assert!(ns.reserve_for_read("idx_age").is_ok());
}

/// Repopulating a readable index withdraws reads while it runs.
#[test]
fn test_repopulate_refuses_reads() {
    let ns = namespace();
    ns.create(IndexDefinition::new("test", "idx_age", "age", KeyType::Integer))
        .unwrap();
    ns.populate("idx_age", &mut VecScan::new(Vec::new())).unwrap();
    assert!(ns.reserve_for_read("idx_age").is_ok());

    let mut scan = ReadingScan {
        ns: &ns,
        index: "idx_age",
        inner: VecScan::new(vec![scanned("a", None, "age", Value::from(1))]),
        reads: Vec::new(),
    };
    assert_eq!(ns.populate("idx_age", &mut scan).unwrap(), 1);
    assert_eq!(scan.reads, vec![false, false]);
    assert!(ns.reserve_for_read("idx_age").is_ok());
}

/// A failed scan clears the populating state and leaves the index
/// write-only; a failed repair keeps it desynced.
#[test]
fn test_failed_scan_leaves_write_only() {
    let ns = namespace();
    ns.create(IndexDefinition::new("test", "idx_age", "age", KeyType::Integer))
        .unwrap();
    let records = vec![
        scanned("a", None, "age", Value::from(1)),
        scanned("b", None, "age", Value::from(2)),
    ];

    let mut failing = FailingScan {
        inner: VecScan::new(records.clone()),
        good: 1,
    };
    assert!(ns.populate("idx_age", &mut failing).is_err());
    let index = handle(&ns, "idx_age");
    assert!(!index.is_populating());
    assert_eq!(index.state_label(), "WO");
    assert!(matches!(
        ns.reserve_for_read("idx_age"),
        Err(SindexError::NotReadable(_))
    ));

    ns.populate("idx_age", &mut VecScan::new(records.clone())).unwrap();
    ns.mark_desync("idx_age").unwrap();
    let mut failing = FailingScan {
        inner: VecScan::new(records),
        good: 0,
    };
    assert!(ns.repair("idx_age", &mut failing).is_err());
    assert!(!index.is_populating());
    assert_eq!(index.sync_state(), "needsync");
    assert!(ns.reserve_for_read("idx_age").is_err());
}

/// Population indexes matching records only, then opens reads.
#[test]
fn test_populate_filters_by_set() {
    let ns = namespace();
    ns.create(
        IndexDefinition::new("test", "idx_city", "city", KeyType::String).with_set("users"),
    )
    .unwrap();

    let mut scan = VecScan::new(vec![
        scanned("u1", Some("users"), "city", Value::from("Oslo")),
        scanned("u2", Some("users"), "city", Value::from("Lima")),
        scanned("o1", Some("orders"), "city", Value::from("Oslo")),
        scanned("u3", Some("users"), "name", Value::from("Oslo")),
    ]);
    assert_eq!(ns.populate("idx_city", &mut scan).unwrap(), 4);

    let index = ns.reserve_for_read("idx_city").unwrap();
    assert_eq!(
        index.lookup_eq(&IndexKey::from_str_value("Oslo")),
        vec![RecordKey::from_user_key("u1")]
    );
    let stats = ns.stats("idx_city").unwrap();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.counters.populated, 4);
    assert_eq!(stats.load_pct, 100);
}

/// Emptying a set drops the entries of its indexes only.
#[test]
fn test_empty_set() {
    let ns = namespace();
    ns.create(
        IndexDefinition::new("test", "idx_users", "age", KeyType::Integer).with_set("users"),
    )
    .unwrap();
    ns.create(
        IndexDefinition::new("test", "idx_orders", "age", KeyType::Integer).with_set("orders"),
    )
    .unwrap();
    let record = RecordKey::from_user_key("r");
    let value = Value::from(3);
    ns.on_bin_change(Some("users"), "age", None, Some(&value), &record);
    ns.on_bin_change(Some("orders"), "age", None, Some(&value), &record);

    assert_eq!(ns.empty_set(Some("users")), 1);
    assert!(handle(&ns, "idx_users").lookup_eq(&IndexKey::from_int(3)).is_empty());
    assert_eq!(handle(&ns, "idx_users").stats().objects(), 0);
    assert_eq!(handle(&ns, "idx_orders").lookup_eq(&IndexKey::from_int(3)), vec![record]);
}

/// put_record indexes a single record into a single index.
#[test]
fn test_put_record() {
    let ns = namespace();
    ns.create(IndexDefinition::new("test", "idx_age", "age", KeyType::Integer))
        .unwrap();
    let outcome = ns
        .put_record("idx_age", &scanned("r", None, "age", Value::from(9)))
        .unwrap();
    assert_eq!(outcome.inserted, 1);
    assert!(matches!(
        ns.put_record("missing", &scanned("r", None, "age", Value::from(9))),
        Err(SindexError::NotFound(_))
    ));
}
