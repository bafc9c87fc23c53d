//! The document-store collaborator contract. The engine only ever talks to the
//! store through this narrow interface; `http_store` provides the wire binding.

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;

/// Failures surfaced by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection-level failure (unreachable host, TLS/auth). Not retried.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The store refused the request (malformed, overloaded, rejected bulk).
    #[error("store rejected request: {0}")]
    Rejected(String),
    /// A single request exceeded its timeout.
    #[error("request timed out")]
    Timeout,
}

impl StoreError {
    /// Rejections and timeouts are transient; connection loss is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Rejected(_) | StoreError::Timeout)
    }
}

/// Cluster identity, fetched once at startup to fail fast when unreachable.
#[derive(Clone, Debug)]
pub struct ClusterInfo {
    pub cluster_name: String,
    pub version: String,
}

/// One raw document produced by a scan: stable id plus its source fields.
#[derive(Clone, Debug)]
pub struct ScannedDoc {
    pub id: String,
    pub source: Value,
}

/// Half-open time filter `[since, until)` on a timestamp field.
#[derive(Clone, Debug)]
pub struct TimeFilter {
    pub field: String,
    pub since: Option<OffsetDateTime>,
    pub until: Option<OffsetDateTime>,
}

/// Parameters for one scan over an index.
#[derive(Clone, Debug)]
pub struct ScanRequest {
    pub index: String,
    pub page_size: usize,
    /// How long the store keeps the consistent read view behind the cursor alive.
    pub keep_alive: Duration,
    pub timeout: Duration,
    pub filter: Option<TimeFilter>,
}

/// A delete action for one document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteOp {
    pub index: String,
    pub id: String,
    pub doc_type: Option<String>,
}

/// Per-item outcome of a bulk delete. `shard_successes` counts replica-level
/// acknowledgements as reported by the store.
#[derive(Clone, Debug)]
pub struct DeleteOutcome {
    pub id: String,
    pub found: bool,
    pub shard_successes: u64,
}

/// Exact-match query on a single field, used by the consistency checker.
#[derive(Clone, Debug)]
pub struct ExactQuery {
    pub index: String,
    pub field: String,
    pub value: String,
}

/// One live document returned for an exact-match query.
#[derive(Clone, Debug)]
pub struct QueryHit {
    pub id: String,
    pub index: String,
    pub doc_type: Option<String>,
    /// The queried field's value as stored, when the store returns it.
    pub field_value: Option<String>,
}

/// Per-query outcome of a multi-query batch.
#[derive(Clone, Debug)]
pub struct QueryOutcome {
    pub total: u64,
    pub hits: Vec<QueryHit>,
}

/// Lazy, finite, non-restartable document sequence. A store error mid-sequence
/// surfaces as an `Err` item; clean exhaustion ends the iterator without one.
pub type DocStream<'a> = Box<dyn Iterator<Item = Result<ScannedDoc, StoreError>> + 'a>;

/// The store operations the engine consumes. Implementations own pagination
/// cursors and transport concerns; the engine owns all dedup semantics.
pub trait DocumentStore {
    fn cluster_info(&self) -> Result<ClusterInfo, StoreError>;

    /// Open a new scan. The returned sequence is not restartable once
    /// partially consumed; create a new scan per window or attempt.
    fn scan(&self, request: &ScanRequest) -> Result<DocStream<'_>, StoreError>;

    fn bulk_delete(
        &self,
        ops: &[DeleteOp],
        timeout: Duration,
    ) -> Result<Vec<DeleteOutcome>, StoreError>;

    fn multi_query(
        &self,
        queries: &[ExactQuery],
        timeout: Duration,
    ) -> Result<Vec<QueryOutcome>, StoreError>;

    /// Toggle external writability of an index. Use through [`WriteBlock`] so
    /// the setting is restored on every exit path.
    fn set_index_writable(&self, index: &str, writable: bool) -> Result<(), StoreError>;
}

/// Scoped write block on an index. Acquiring blocks external writes; dropping
/// the guard re-enables them, including on error and panic paths.
pub struct WriteBlock<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    index: String,
    armed: bool,
}

impl<'a, S: DocumentStore + ?Sized> WriteBlock<'a, S> {
    pub fn acquire(store: &'a S, index: &str) -> Result<Self, StoreError> {
        store.set_index_writable(index, false)?;
        Ok(Self {
            store,
            index: index.to_string(),
            armed: true,
        })
    }

    /// Re-enable writes eagerly, surfacing the store error to the caller.
    pub fn release(mut self) -> Result<(), StoreError> {
        self.armed = false;
        self.store.set_index_writable(&self.index, true)
    }
}

impl<S: DocumentStore + ?Sized> Drop for WriteBlock<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.store.set_index_writable(&self.index, true) {
                tracing::error!(index = %self.index, error = %e, "failed to re-enable index writes");
            }
        }
    }
}
