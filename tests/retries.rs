#[path = "common/mod.rs"]
mod common;

use common::*;
use docdedupe::{Backoff, DedupeError, Deduper, StoreError};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[test]
fn backoff_doubles_from_initial() {
    let policy = Backoff::new(5, 2);
    // the nth retry (1-based) waits initial * 2^(n-1)
    assert_eq!(policy.delay(0), Duration::from_secs(2));
    assert_eq!(policy.delay(1), Duration::from_secs(4));
    assert_eq!(policy.delay(2), Duration::from_secs(8));
    assert_eq!(policy.delay(3), Duration::from_secs(16));
}

fn seed_one_bucket(store: &MockStore, docs: usize) {
    for i in 0..docs {
        store.seed(&format!("d{i}"), json!({ "name": "foo" }));
    }
}

#[test]
fn rejected_chunks_are_retried_until_success() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    seed_one_bucket(&store, 4);
    store.fail_next_bulk(StoreError::Rejected("bulk queue full".into()));
    store.fail_next_bulk(StoreError::Rejected("bulk queue full".into()));

    let opts = test_options(dir.path()).with_initial_backoff_secs(0);
    let report = Deduper::new(opts).run(&store).unwrap();

    assert_eq!(report.total_deleted(), 3);
    assert_eq!(store.count(), 1);
    assert_eq!(store.bulk_calls.load(Ordering::Relaxed), 3);
}

#[test]
fn timeouts_are_retried_like_rejections() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    seed_one_bucket(&store, 3);
    store.fail_next_bulk(StoreError::Timeout);

    let opts = test_options(dir.path()).with_initial_backoff_secs(0);
    let report = Deduper::new(opts).run(&store).unwrap();

    assert_eq!(report.total_deleted(), 2);
    assert_eq!(store.bulk_calls.load(Ordering::Relaxed), 2);
}

#[test]
fn lenient_mode_records_failed_chunks_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    // 16 docs, one key: 15 delete ops split into chunks of 10 and 5
    seed_one_bucket(&store, 16);
    for _ in 0..4 {
        store.fail_next_bulk(StoreError::Rejected("bulk queue full".into()));
    }

    let opts = test_options(dir.path())
        .with_initial_backoff_secs(0)
        .with_check(false);
    let report = Deduper::new(opts).run(&store).unwrap();

    let cycle = &report.cycles[0];
    // first chunk exhausted max_retries (3), second chunk went through
    assert_eq!(cycle.failed_chunks, 1);
    assert_eq!(cycle.deleted, 5);
    assert_eq!(store.count(), 11);
    assert_eq!(store.bulk_calls.load(Ordering::Relaxed), 5);
}

#[test]
fn fail_fast_aborts_on_exhausted_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    seed_one_bucket(&store, 16);
    for _ in 0..4 {
        store.fail_next_bulk(StoreError::Rejected("bulk queue full".into()));
    }

    let opts = test_options(dir.path())
        .with_initial_backoff_secs(0)
        .with_fail_fast(true)
        .with_check(false);
    let err = Deduper::new(opts).run(&store).unwrap_err();

    match err {
        DedupeError::ChunkFailed { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.bulk_calls.load(Ordering::Relaxed), 4);
}

#[test]
fn connection_loss_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    seed_one_bucket(&store, 3);
    store.fail_next_bulk(StoreError::Unavailable("connection reset".into()));

    let opts = test_options(dir.path())
        .with_initial_backoff_secs(0)
        .with_fail_fast(true)
        .with_check(false);
    let err = Deduper::new(opts).run(&store).unwrap_err();

    match err {
        DedupeError::ChunkFailed { attempts, .. } => assert_eq!(attempts, 1),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.bulk_calls.load(Ordering::Relaxed), 1);
    assert_eq!(store.count(), 3);
}
