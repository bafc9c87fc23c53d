#[path = "common/mod.rs"]
mod common;

use common::*;
use docdedupe::{read_entries, DedupeError, Deduper};
use serde_json::json;

/// 100 documents, two distinct key values split 50/50.
fn seed_fifty_fifty(store: &MockStore) {
    for i in 0..100 {
        let name = if i % 2 == 0 { "foo" } else { "bar" };
        store.seed(&format!("d{i}"), json!({ "name": name }));
    }
}

#[test]
fn detects_and_removes_fifty_fifty_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    seed_fifty_fifty(&store);

    let report = Deduper::new(test_options(dir.path())).run(&store).unwrap();

    assert_eq!(report.cycles.len(), 1);
    let cycle = &report.cycles[0];
    assert_eq!(cycle.scanned, 100);
    assert_eq!(cycle.unique_keys, 2);
    assert_eq!(cycle.duplicates, 98);
    assert_eq!(cycle.deleted, 98);
    assert_eq!(cycle.failed_chunks, 0);
    assert_eq!(store.count(), 2);

    // the check re-queried both retained keys and found them unique
    let check = cycle.check.expect("consistency check ran");
    assert_eq!(check.ok, 2);
    assert_eq!(check.fixable, 0);
    assert_eq!(check.missing, 0);

    // pending entries were consumed; verified survivors were re-logged
    assert!(!dir.path().join("dedupe.pending").exists());
    let done = read_entries(&dir.path().join("dedupe.done")).unwrap();
    assert_eq!(done.len(), 2);
}

#[test]
fn first_arrival_survives() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    seed_fifty_fifty(&store);

    Deduper::new(test_options(dir.path())).run(&store).unwrap();

    let mut ids = store.ids();
    ids.sort();
    assert_eq!(ids, vec!["d0".to_string(), "d1".to_string()]);
}

#[test]
fn second_run_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    seed_fifty_fifty(&store);

    Deduper::new(test_options(dir.path())).run(&store).unwrap();
    let second = Deduper::new(test_options(dir.path())).run(&store).unwrap();

    assert_eq!(second.cycles[0].duplicates, 0);
    assert_eq!(second.cycles[0].deleted, 0);
    assert_eq!(store.count(), 2);
}

#[test]
fn noop_mode_deletes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    seed_fifty_fifty(&store);

    let opts = test_options(dir.path()).with_noop(true);
    let report = Deduper::new(opts).run(&store).unwrap();

    let cycle = &report.cycles[0];
    assert_eq!(cycle.duplicates, 98);
    assert_eq!(cycle.deleted, 0);
    assert!(cycle.check.is_none());
    assert_eq!(store.count(), 100);
    assert!(!dir.path().join("dedupe.pending").exists());
}

#[test]
fn digest_keys_group_on_all_fields() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    store.seed("d0", json!({ "name": "a", "num": 1 }));
    store.seed("d1", json!({ "name": "a", "num": 1 }));
    store.seed("d2", json!({ "name": "a", "num": 2 }));
    store.seed("d3", json!({ "name": "b", "num": 1 }));

    let opts = test_options(dir.path()).with_key_fields(["name", "num"]);
    let report = Deduper::new(opts).run(&store).unwrap();

    let cycle = &report.cycles[0];
    assert_eq!(cycle.unique_keys, 3);
    assert_eq!(cycle.duplicates, 1);
    assert_eq!(cycle.deleted, 1);
    assert_eq!(store.count(), 3);
    // digest keys cannot be re-queried, so no check runs
    assert!(cycle.check.is_none());
}

#[test]
fn missing_key_field_fails_the_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    store.seed("d0", json!({ "name": "foo" }));
    store.seed("d1", json!({ "other": "foo" }));

    let err = Deduper::new(test_options(dir.path()))
        .run(&store)
        .unwrap_err();
    assert!(matches!(
        err,
        DedupeError::KeyFieldMissing { ref doc_id, .. } if doc_id.as_str() == "d1"
    ));
    assert_eq!(store.count(), 2);
}

#[test]
fn mapping_file_written_per_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    seed_fifty_fifty(&store);

    let map_path = dir.path().join("mapping.json");
    let opts = test_options(dir.path()).with_mapping_path(&map_path);
    Deduper::new(opts).run(&store).unwrap();

    let mapping: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&map_path).unwrap()).unwrap();
    let obj = mapping.as_object().unwrap();
    assert_eq!(obj.len(), 2);
    assert_eq!(obj["foo"].as_array().unwrap().len(), 50);
    assert_eq!(obj["foo"][0], "d0");
}

#[test]
fn write_block_is_scoped_to_the_scan() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    seed_fifty_fifty(&store);

    let opts = test_options(dir.path()).with_block_writes(true);
    Deduper::new(opts).run(&store).unwrap();

    assert_eq!(store.write_toggles(), vec![false, true]);
}

#[test]
fn write_block_is_released_when_the_scan_fails() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    seed_fifty_fifty(&store);
    store
        .scan_error
        .store(true, std::sync::atomic::Ordering::Relaxed);

    let opts = test_options(dir.path()).with_block_writes(true);
    Deduper::new(opts).run(&store).unwrap_err();

    // the guard restored writability even though the cycle failed
    assert_eq!(store.write_toggles(), vec![false, true]);
}

#[test]
fn scan_errors_abort_the_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    seed_fifty_fifty(&store);
    store
        .scan_error
        .store(true, std::sync::atomic::Ordering::Relaxed);

    let err = Deduper::new(test_options(dir.path()))
        .run(&store)
        .unwrap_err();
    assert!(matches!(
        err,
        DedupeError::Store(docdedupe::StoreError::Unavailable(_))
    ));
    // an incomplete scan never feeds the delete phase
    assert_eq!(store.count(), 100);
}

#[test]
fn unreachable_store_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    seed_fifty_fifty(&store);
    store
        .ping_fails
        .store(true, std::sync::atomic::Ordering::Relaxed);

    let err = Deduper::new(test_options(dir.path()))
        .run(&store)
        .unwrap_err();
    assert!(matches!(err, DedupeError::Connectivity(_)));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(store.count(), 100);
}
