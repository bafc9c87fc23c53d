//! Post-deletion consistency check: re-query every retained key and verify the
//! store now holds exactly one live document for it. Defends against the
//! read-after-write lag between the scan's consistent view and the store's
//! state at delete time.

use crate::config::DedupeOptions;
use crate::delete::{CancelToken, DeletePipeline};
use crate::dup_log::{append_entries, read_entries, RetainedEntry};
use crate::error::DedupeError;
use crate::progress::ProgressScope;
use crate::store::{DeleteOp, DocumentStore, ExactQuery, QueryOutcome};
use std::path::Path;

/// Per-key classification totals. `removed` counts extra survivors deleted
/// while fixing still-duplicated keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CheckStats {
    pub ok: u64,
    pub fixable: u64,
    pub missing: u64,
    pub removed: u64,
}

impl CheckStats {
    pub fn checked(&self) -> u64 {
        self.ok + self.fixable + self.missing
    }
}

/// How many times a failed multi-query batch is re-sent before giving up.
const BATCH_RETRIES: u32 = 5;

pub struct ConsistencyChecker<'a> {
    opts: &'a DedupeOptions,
    cancel: &'a CancelToken,
}

impl<'a> ConsistencyChecker<'a> {
    pub fn new(opts: &'a DedupeOptions, cancel: &'a CancelToken) -> Self {
        Self { opts, cancel }
    }

    /// Verify every entry in `log_path`. The caller decides what to do with
    /// the consumed log afterwards.
    pub fn check_log<S: DocumentStore + Sync>(
        &self,
        store: &S,
        log_path: &Path,
    ) -> Result<CheckStats, DedupeError> {
        let field = match self.opts.key_fields.as_slice() {
            [field] => field.clone(),
            _ => {
                return Err(DedupeError::Config(
                    "consistency checks need a single key field; digest keys cannot be re-queried"
                        .into(),
                ))
            }
        };
        let entries = read_entries(log_path).map_err(|e| DedupeError::CheckLogUnreadable {
            path: log_path.to_path_buf(),
            source: e,
        })?;
        if entries.is_empty() {
            tracing::info!(path = %log_path.display(), "nothing to verify");
            return Ok(CheckStats::default());
        }
        tracing::info!(keys = entries.len(), path = %log_path.display(), "verifying retained documents");
        let pb = if self.opts.progress {
            Some(ProgressScope::count(
                "Checking consistency",
                entries.len() as u64,
            ))
        } else {
            None
        };

        let mut stats = CheckStats::default();
        for batch in entries.chunks(self.opts.flush) {
            if self.cancel.is_cancelled() {
                tracing::info!("cancellation requested, stopping consistency check");
                break;
            }
            let outcomes = self.query_batch(store, batch, &field)?;
            // fewer statuses than queries means the cluster answered
            // incompletely; numbers from here on would be misleading
            if outcomes.len() < batch.len() {
                return Err(DedupeError::ConsistencyWarning {
                    queried: batch.len() as u64,
                    reported: outcomes.len() as u64,
                });
            }
            self.settle_batch(store, batch, outcomes, &mut stats)?;
            if let Some(pb) = &pb {
                pb.inc_items(batch.len() as u64);
            }
        }
        if let Some(pb) = &pb {
            pb.finish("check done");
        }

        let sum = stats.checked();
        let ok_pct = if sum > 0 {
            stats.ok as f64 / sum as f64 * 100.0
        } else {
            100.0
        };
        tracing::info!(
            ok = stats.ok,
            fixable = stats.fixable,
            missing = stats.missing,
            removed = stats.removed,
            "consistency check finished ({ok_pct:.2}% ok)"
        );
        Ok(stats)
    }

    fn settle_batch<S: DocumentStore + Sync>(
        &self,
        store: &S,
        batch: &[RetainedEntry],
        outcomes: Vec<QueryOutcome>,
        stats: &mut CheckStats,
    ) -> Result<(), DedupeError> {
        let mut extras: Vec<DeleteOp> = Vec::new();
        let mut verified: Vec<RetainedEntry> = Vec::new();
        for (entry, outcome) in batch.iter().zip(outcomes) {
            match outcome.total {
                0 => {
                    stats.missing += 1;
                    tracing::debug!(key = %entry.key_value, index = %entry.index, "logged document now absent");
                }
                1 => stats.ok += 1,
                live => {
                    stats.fixable += 1;
                    tracing::debug!(key = %entry.key_value, live, "key still duplicated");
                }
            }
            if let Some(first) = outcome.hits.first() {
                verified.push(RetainedEntry {
                    key_value: first
                        .field_value
                        .clone()
                        .unwrap_or_else(|| entry.key_value.clone()),
                    index: first.index.clone(),
                    doc_type: first.doc_type.clone(),
                    id: first.id.clone(),
                });
            }
            for extra in outcome.hits.iter().skip(1) {
                extras.push(DeleteOp {
                    index: extra.index.clone(),
                    id: extra.id.clone(),
                    doc_type: extra.doc_type.clone(),
                });
            }
        }
        if !extras.is_empty() {
            tracing::info!(redundant = extras.len(), "removing surviving duplicates");
            let pipeline = DeletePipeline::from_options(self.opts, self.cancel).quiet();
            let report = pipeline.run(store, extras.into_iter(), 0)?;
            stats.removed += report.deleted;
        }
        if !verified.is_empty() && !self.opts.noop {
            append_entries(&self.opts.done_log, verified)?;
        }
        Ok(())
    }

    fn query_batch<S: DocumentStore>(
        &self,
        store: &S,
        batch: &[RetainedEntry],
        field: &str,
    ) -> Result<Vec<QueryOutcome>, DedupeError> {
        let queries: Vec<ExactQuery> = batch
            .iter()
            .map(|e| ExactQuery {
                index: e.index.clone(),
                field: field.to_string(),
                value: e.key_value.clone(),
            })
            .collect();
        let mut attempt = 0u32;
        loop {
            match store.multi_query(&queries, self.opts.request_timeout) {
                Ok(outcomes) => return Ok(outcomes),
                Err(e) if e.is_retryable() && attempt < BATCH_RETRIES => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "multi-query batch failed, retrying");
                    std::thread::sleep(self.opts.batch_pause);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
