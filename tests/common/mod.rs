#![allow(dead_code)]

use docdedupe::{
    ClusterInfo, DedupeOptions, DeleteOp, DeleteOutcome, DocStream, DocumentStore, ExactQuery,
    QueryHit, QueryOutcome, ScanRequest, ScannedDoc, StoreError,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// In-memory stand-in for the remote document store. Documents live in a Vec
/// so scan arrival order is deterministic; failure injection queues let tests
/// exercise the retry paths.
#[derive(Default)]
pub struct MockStore {
    docs: Mutex<Vec<ScannedDoc>>,
    bulk_failures: Mutex<VecDeque<StoreError>>,
    query_failures: Mutex<VecDeque<StoreError>>,
    write_toggles: Mutex<Vec<bool>>,
    pub bulk_calls: AtomicU32,
    pub query_calls: AtomicU32,
    pub ping_fails: AtomicBool,
    /// Fail the scan after its last document, mimicking a lost read view.
    pub scan_error: AtomicBool,
    /// Drop one outcome per multi-query batch, mimicking an incomplete cluster.
    pub short_responses: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, id: &str, source: Value) {
        self.docs.lock().unwrap().push(ScannedDoc {
            id: id.to_string(),
            source,
        });
    }

    pub fn count(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    pub fn ids(&self) -> Vec<String> {
        self.docs
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.id.clone())
            .collect()
    }

    pub fn fail_next_bulk(&self, err: StoreError) {
        self.bulk_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_next_query(&self, err: StoreError) {
        self.query_failures.lock().unwrap().push_back(err);
    }

    /// Writability values set so far, in call order.
    pub fn write_toggles(&self) -> Vec<bool> {
        self.write_toggles.lock().unwrap().clone()
    }
}

impl DocumentStore for MockStore {
    fn cluster_info(&self) -> Result<ClusterInfo, StoreError> {
        if self.ping_fails.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("mock store offline".into()));
        }
        Ok(ClusterInfo {
            cluster_name: "mock-cluster".into(),
            version: "0.0.0".into(),
        })
    }

    fn scan(&self, request: &ScanRequest) -> Result<DocStream<'_>, StoreError> {
        let docs = self.docs.lock().unwrap();
        let mut page: Vec<ScannedDoc> = Vec::new();
        for doc in docs.iter() {
            if let Some(filter) = &request.filter {
                let ts = doc
                    .source
                    .get(&filter.field)
                    .and_then(Value::as_str)
                    .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok());
                match ts {
                    Some(ts) => {
                        if let Some(since) = filter.since {
                            if ts < since {
                                continue;
                            }
                        }
                        if let Some(until) = filter.until {
                            if ts >= until {
                                continue;
                            }
                        }
                    }
                    None => continue,
                }
            }
            page.push(doc.clone());
        }
        if self.scan_error.load(Ordering::Relaxed) {
            let tail = std::iter::once(Err(StoreError::Unavailable("read view lost".into())));
            return Ok(Box::new(page.into_iter().map(Ok).chain(tail)));
        }
        Ok(Box::new(page.into_iter().map(Ok)))
    }

    fn bulk_delete(
        &self,
        ops: &[DeleteOp],
        _timeout: Duration,
    ) -> Result<Vec<DeleteOutcome>, StoreError> {
        self.bulk_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(err) = self.bulk_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let mut docs = self.docs.lock().unwrap();
        let outcomes = ops
            .iter()
            .map(|op| {
                let before = docs.len();
                docs.retain(|d| d.id != op.id);
                let found = docs.len() < before;
                DeleteOutcome {
                    id: op.id.clone(),
                    found,
                    shard_successes: u64::from(found),
                }
            })
            .collect();
        Ok(outcomes)
    }

    fn multi_query(
        &self,
        queries: &[ExactQuery],
        _timeout: Duration,
    ) -> Result<Vec<QueryOutcome>, StoreError> {
        self.query_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(err) = self.query_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let docs = self.docs.lock().unwrap();
        let mut outcomes: Vec<QueryOutcome> = queries
            .iter()
            .map(|q| {
                let hits: Vec<QueryHit> = docs
                    .iter()
                    .filter(|d| {
                        d.source.get(&q.field).and_then(Value::as_str) == Some(q.value.as_str())
                    })
                    .map(|d| QueryHit {
                        id: d.id.clone(),
                        index: q.index.clone(),
                        doc_type: None,
                        field_value: Some(q.value.clone()),
                    })
                    .collect();
                QueryOutcome {
                    total: hits.len() as u64,
                    hits,
                }
            })
            .collect();
        if self.short_responses.load(Ordering::Relaxed) {
            outcomes.pop();
        }
        Ok(outcomes)
    }

    fn set_index_writable(&self, _index: &str, writable: bool) -> Result<(), StoreError> {
        self.write_toggles.lock().unwrap().push(writable);
        Ok(())
    }
}

/// Options wired for tests: tiny chunks, no pauses, no progress bars, all logs
/// under the test's temp dir.
pub fn test_options(dir: &Path) -> DedupeOptions {
    DedupeOptions::default()
        .with_index("test-index")
        .with_key_field("name")
        .with_flush(10)
        .with_batch_pause(Duration::ZERO)
        .with_progress(false)
        .with_mem_report_every(0)
        .with_pending_log(dir.join("dedupe.pending"))
        .with_done_log(dir.join("dedupe.done"))
}
