//! Orchestration: window iteration, scan cycles, duplicate detection, the
//! delete phase and the post-delete consistency check.

use crate::check::{CheckStats, ConsistencyChecker};
use crate::config::DedupeOptions;
use crate::delete::{CancelToken, DeletePipeline};
use crate::dup_log::{append_entries, write_mapping, RetainedEntry};
use crate::error::DedupeError;
use crate::index::HashIndex;
use crate::key::KeyBuilder;
use crate::mem::{human_bytes, process_rss};
use crate::store::{DocumentStore, ScanRequest, TimeFilter, WriteBlock};
use crate::util::init_tracing_once;
use crate::window::tile;
use std::path::Path;
use std::time::{Duration, Instant};

/// Per-cycle summary, reported regardless of partial failure so an operator
/// can resume from a known state.
#[derive(Clone, Debug, Default)]
pub struct CycleStats {
    pub scanned: u64,
    pub unique_keys: u64,
    pub duplicates: u64,
    pub deleted: u64,
    pub missing: u64,
    pub failed_chunks: usize,
    pub check: Option<CheckStats>,
}

/// Whole-run summary across all windows.
#[derive(Debug, Default)]
pub struct RunReport {
    pub cycles: Vec<CycleStats>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn total_scanned(&self) -> u64 {
        self.cycles.iter().map(|c| c.scanned).sum()
    }
    pub fn total_duplicates(&self) -> u64 {
        self.cycles.iter().map(|c| c.duplicates).sum()
    }
    pub fn total_deleted(&self) -> u64 {
        self.cycles.iter().map(|c| c.deleted).sum()
    }
}

pub struct Deduper {
    opts: DedupeOptions,
    cancel: CancelToken,
}

impl Deduper {
    pub fn new(opts: DedupeOptions) -> Self {
        Self {
            opts,
            cancel: CancelToken::new(),
        }
    }

    pub fn options(&self) -> &DedupeOptions {
        &self.opts
    }

    /// Token shared with the embedding application; setting it stops the run
    /// cleanly between pages and chunks.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// One full deduplication run: fail-fast connectivity probe, then one
    /// Scan→Detect→Delete(→Check) cycle per window (or a single unbounded
    /// cycle when no timestamp field is configured).
    pub fn run<S: DocumentStore + Sync>(&self, store: &S) -> Result<RunReport, DedupeError> {
        init_tracing_once();
        self.opts.validate()?;
        let started = Instant::now();

        let info = store.cluster_info().map_err(DedupeError::Connectivity)?;
        tracing::info!(cluster = %info.cluster_name, version = %info.version, "connected to document store");
        if self.opts.noop {
            tracing::info!("running in no-op mode, no document will be deleted");
        }

        let key = KeyBuilder::new(self.opts.key_fields.clone());
        tracing::info!(index = %self.opts.index, fields = ?key.fields(), "deduplicating");

        let mut report = RunReport::default();
        for filter in self.cycle_filters() {
            if self.cancel.is_cancelled() {
                break;
            }
            if let Some(f) = &filter {
                tracing::info!(field = %f.field, since = ?f.since, until = ?f.until, "processing window");
            }
            let stats = self.run_cycle(store, &key, filter)?;
            report.cycles.push(stats);
        }
        report.cancelled = self.cancel.is_cancelled();

        report.elapsed = started.elapsed();
        tracing::info!(
            cycles = report.cycles.len(),
            scanned = report.total_scanned(),
            duplicates = report.total_duplicates(),
            deleted = report.total_deleted(),
            elapsed_secs = report.elapsed.as_secs_f64(),
            "deduplication finished"
        );
        Ok(report)
    }

    /// Standalone verification of a previously written retained log.
    pub fn check_log_file<S: DocumentStore + Sync>(
        &self,
        store: &S,
        path: &Path,
    ) -> Result<CheckStats, DedupeError> {
        init_tracing_once();
        let info = store.cluster_info().map_err(DedupeError::Connectivity)?;
        tracing::info!(cluster = %info.cluster_name, "connected to document store");
        ConsistencyChecker::new(&self.opts, &self.cancel).check_log(store, path)
    }

    /// One filter per cycle: tiled windows when a window size is configured,
    /// otherwise a single pass over the requested (or unbounded) range.
    fn cycle_filters(&self) -> Vec<Option<TimeFilter>> {
        let field = match &self.opts.timestamp_field {
            Some(f) => f.clone(),
            None => return vec![None],
        };
        match (self.opts.window, self.opts.since, self.opts.until) {
            (Some(step), Some(since), Some(until)) => tile(since, until, step)
                .map(|w| {
                    Some(TimeFilter {
                        field: field.clone(),
                        since: Some(w.start),
                        until: Some(w.end),
                    })
                })
                .collect(),
            _ => vec![Some(TimeFilter {
                field,
                since: self.opts.since,
                until: self.opts.until,
            })],
        }
    }

    fn run_cycle<S: DocumentStore + Sync>(
        &self,
        store: &S,
        key: &KeyBuilder,
        filter: Option<TimeFilter>,
    ) -> Result<CycleStats, DedupeError> {
        let request = ScanRequest {
            index: self.opts.index.clone(),
            page_size: self.opts.page_size,
            keep_alive: self.opts.scroll_keep_alive,
            timeout: self.opts.request_timeout,
            filter,
        };
        // optionally freeze external writers so the scanned state cannot grow
        // new duplicates mid-cycle; the guard restores writability on every
        // exit path, failures included
        let write_block = if self.opts.block_writes && !self.opts.noop {
            Some(WriteBlock::acquire(store, &self.opts.index).map_err(DedupeError::Store)?)
        } else {
            None
        };
        let index = self.scan_into_index(store, key, &request)?;
        if let Some(guard) = write_block {
            guard.release().map_err(DedupeError::Store)?;
        }

        let mut stats = CycleStats {
            scanned: index.scanned(),
            unique_keys: index.unique_keys(),
            duplicates: index.duplicates(),
            ..CycleStats::default()
        };
        if self.cancel.is_cancelled() {
            // an interrupted scan is incomplete; deleting from it could remove
            // a bucket's only observed copy
            tracing::info!("scan interrupted, skipping deletion for this cycle");
            return Ok(stats);
        }
        if stats.duplicates == 0 {
            tracing::info!(scanned = stats.scanned, "no duplicates found");
            return Ok(stats);
        }
        let ratio = stats.duplicates as f64 / stats.scanned.max(1) as f64 * 100.0;
        tracing::info!(
            duplicates = stats.duplicates,
            scanned = stats.scanned,
            unique_keys = stats.unique_keys,
            "found duplicates ({ratio:.1}% of scanned documents)"
        );

        if let Some(path) = &self.opts.mapping_path {
            tracing::info!(path = %path.display(), "storing documents mapping");
            write_mapping(path, &index)?;
        }

        let pipeline = DeletePipeline::from_options(&self.opts, &self.cancel);
        let ops = index.delete_ops(&self.opts.index, self.opts.doc_type.as_deref());
        let outcome = pipeline.run(store, ops, stats.duplicates)?;
        stats.deleted = outcome.deleted;
        stats.missing = outcome.missing;
        stats.failed_chunks = outcome.failed_chunks.len();
        tracing::info!(
            deleted = outcome.deleted,
            shard_copies = outcome.shard_successes,
            failed_chunks = outcome.failed_chunks.len(),
            "delete phase finished"
        );

        if !self.opts.noop && outcome.deleted > 0 {
            let survivors = index.survivors().map(|(k, id)| RetainedEntry {
                key_value: k.to_string(),
                index: self.opts.index.clone(),
                doc_type: self.opts.doc_type.clone(),
                id: id.to_string(),
            });
            append_entries(&self.opts.pending_log, survivors)?;
        }

        if outcome.cancelled {
            return Ok(stats);
        }

        if self.opts.check && !self.opts.noop && self.opts.pending_log.exists() {
            if key.is_single() {
                stats.check = Some(self.verify_pending(store)?);
            } else {
                tracing::warn!("skipping consistency check: digest keys cannot be re-queried");
            }
        }
        Ok(stats)
    }

    fn verify_pending<S: DocumentStore + Sync>(&self, store: &S) -> Result<CheckStats, DedupeError> {
        let checker = ConsistencyChecker::new(&self.opts, &self.cancel);
        let stats = checker.check_log(store, &self.opts.pending_log)?;
        if !self.cancel.is_cancelled() {
            // entries are verified exactly once
            std::fs::remove_file(&self.opts.pending_log)?;
        }
        Ok(stats)
    }

    /// Pull the scan one document at a time into a fresh hash index. The page
    /// cursor is stateful, so scanning stays strictly single-threaded.
    fn scan_into_index<S: DocumentStore>(
        &self,
        store: &S,
        key: &KeyBuilder,
        request: &ScanRequest,
    ) -> Result<HashIndex, DedupeError> {
        let mut index = HashIndex::new();
        let docs = store.scan(request)?;
        for doc in docs {
            if self.cancel.is_cancelled() {
                break;
            }
            let doc = doc?;
            let k = key.key_for(&doc.id, &doc.source)?;
            index.insert(k, doc.id);
            if self.opts.mem_report_every > 0 && index.scanned() % self.opts.mem_report_every == 0
            {
                tracing::info!(
                    scanned = index.scanned(),
                    unique_keys = index.unique_keys(),
                    rss = %human_bytes(process_rss()),
                    "scan progress"
                );
            }
        }
        Ok(index)
    }
}
