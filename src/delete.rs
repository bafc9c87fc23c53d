//! Deletion pipeline: chunked bulk deletes, sequential or through a bounded
//! worker pool, with per-chunk retry and exponential backoff.

use crate::config::DedupeOptions;
use crate::error::DedupeError;
use crate::progress::ProgressScope;
use crate::retry::{with_retries, Backoff};
use crate::store::{DeleteOp, DocumentStore, StoreError};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative cancellation. A set token stops the engine between pages and
/// chunks; a chunk already submitted runs to completion.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One chunk that exhausted its retries in lenient mode. The ops are kept so
/// the deletes can be replayed manually.
#[derive(Debug)]
pub struct FailedChunk {
    pub attempts: u32,
    pub error: StoreError,
    pub ops: Vec<DeleteOp>,
}

/// Totals from one pipeline run.
#[derive(Debug, Default)]
pub struct DeleteReport {
    pub deleted: u64,         // documents found and removed
    pub shard_successes: u64, // replica-level acknowledgements
    pub missing: u64,         // targets already gone
    pub failed_chunks: Vec<FailedChunk>,
    pub cancelled: bool,
}

#[derive(Default)]
struct ChunkOutcome {
    deleted: u64,
    shard_successes: u64,
    missing: u64,
    failed: Option<FailedChunk>,
}

pub struct DeletePipeline<'a> {
    backoff: Backoff,
    flush: usize,
    threads: usize,
    timeout: Duration,
    pause: Duration,
    fail_fast: bool,
    noop: bool,
    progress: bool,
    cancel: &'a CancelToken,
}

impl<'a> DeletePipeline<'a> {
    pub fn from_options(opts: &DedupeOptions, cancel: &'a CancelToken) -> Self {
        Self {
            backoff: Backoff::new(opts.max_retries, opts.initial_backoff_secs),
            flush: opts.flush,
            threads: opts.threads,
            timeout: opts.request_timeout,
            pause: opts.batch_pause,
            fail_fast: opts.fail_fast,
            noop: opts.noop,
            progress: opts.progress,
            cancel,
        }
    }

    /// Suppress the progress bar (used for small follow-up deletions).
    pub fn quiet(mut self) -> Self {
        self.progress = false;
        self
    }

    /// Drain `ops` and submit them in chunks of `flush`. `expected` sizes the
    /// progress bar; it does not bound the iterator. Parallel mode keeps up to
    /// `threads` chunks in flight; the parallelism factor is the backpressure
    /// control against the store.
    pub fn run<S: DocumentStore + Sync>(
        &self,
        store: &S,
        ops: impl Iterator<Item = DeleteOp>,
        expected: u64,
    ) -> Result<DeleteReport, DedupeError> {
        let mut ops = ops;
        let mut report = DeleteReport::default();
        let pb = if self.progress && !self.noop {
            Some(ProgressScope::count("Deleting duplicates", expected))
        } else {
            None
        };
        let lanes = self.threads.max(1);

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("cancellation requested, stopping before next chunk");
                report.cancelled = true;
                break;
            }
            let batch = gather(&mut ops, self.flush, lanes);
            if batch.is_empty() {
                break;
            }
            let batch_ops: u64 = batch.iter().map(|c| c.len() as u64).sum();

            if self.noop {
                for chunk in &batch {
                    tracing::info!(ops = chunk.len(), "would submit delete chunk");
                    for op in chunk {
                        tracing::debug!(index = %op.index, id = %op.id, "would delete");
                    }
                }
                continue;
            }

            let outcomes: Vec<Result<ChunkOutcome, DedupeError>> = if batch.len() == 1 {
                vec![self.submit_chunk(store, &batch[0])]
            } else {
                batch
                    .par_iter()
                    .map(|chunk| self.submit_chunk(store, chunk))
                    .collect()
            };
            for outcome in outcomes {
                let outcome = outcome?;
                report.deleted += outcome.deleted;
                report.shard_successes += outcome.shard_successes;
                report.missing += outcome.missing;
                if let Some(failed) = outcome.failed {
                    report.failed_chunks.push(failed);
                }
            }
            if let Some(pb) = &pb {
                pb.inc_items(batch_ops);
            }
            // rate-limit against the store after every destructive batch
            if !self.pause.is_zero() {
                std::thread::sleep(self.pause);
            }
        }

        if let Some(pb) = &pb {
            pb.finish(format!("deleted {}", report.deleted));
        }
        Ok(report)
    }

    fn submit_chunk<S: DocumentStore>(
        &self,
        store: &S,
        chunk: &[DeleteOp],
    ) -> Result<ChunkOutcome, DedupeError> {
        match with_retries(&self.backoff, || store.bulk_delete(chunk, self.timeout)) {
            Ok(items) => {
                let mut outcome = ChunkOutcome::default();
                for item in items {
                    if item.found {
                        outcome.deleted += 1;
                        outcome.shard_successes += item.shard_successes;
                    } else {
                        outcome.missing += 1;
                        tracing::warn!(id = %item.id, "delete target no longer present");
                    }
                }
                Ok(outcome)
            }
            Err((attempts, error)) => {
                for op in chunk {
                    tracing::error!(index = %op.index, id = %op.id, "delete dropped with failed chunk");
                }
                if self.fail_fast {
                    Err(DedupeError::ChunkFailed {
                        attempts,
                        source: error,
                    })
                } else {
                    tracing::warn!(attempts, error = %error, ops = chunk.len(), "chunk failed, continuing");
                    Ok(ChunkOutcome {
                        failed: Some(FailedChunk {
                            attempts,
                            error,
                            ops: chunk.to_vec(),
                        }),
                        ..ChunkOutcome::default()
                    })
                }
            }
        }
    }
}

fn gather(
    ops: &mut impl Iterator<Item = DeleteOp>,
    flush: usize,
    max_chunks: usize,
) -> Vec<Vec<DeleteOp>> {
    let mut batch = Vec::new();
    for _ in 0..max_chunks {
        let chunk: Vec<DeleteOp> = ops.by_ref().take(flush).collect();
        if chunk.is_empty() {
            break;
        }
        batch.push(chunk);
    }
    batch
}
