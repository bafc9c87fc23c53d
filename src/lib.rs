mod check;
mod config;
mod delete;
mod dup_log;
mod engine;
mod error;
mod http_store;
mod index;
mod key;
mod mem;
mod progress;
mod retry;
mod store;
mod util;
mod window;

pub use crate::config::DedupeOptions;
pub use crate::engine::{CycleStats, Deduper, RunReport};
pub use crate::error::DedupeError;

// The store collaborator contract and its HTTP binding.
pub use crate::http_store::HttpStore;
pub use crate::store::{
    ClusterInfo, DeleteOp, DeleteOutcome, DocStream, DocumentStore, ExactQuery, QueryHit,
    QueryOutcome, ScanRequest, ScannedDoc, StoreError, TimeFilter, WriteBlock,
};

// Expose the pipeline pieces so embedders can drive them directly.
pub use crate::check::CheckStats;
pub use crate::delete::{CancelToken, DeletePipeline, DeleteReport, FailedChunk};
pub use crate::index::HashIndex;
pub use crate::key::{DedupKey, KeyBuilder};
pub use crate::retry::{with_retries, Backoff};
pub use crate::window::{tile, Window, WindowSpec};

// Durable artifacts shared with the consistency checker.
pub use crate::dup_log::{append_entries, read_entries, write_mapping, RetainedEntry};

// Export logging setup so binaries can initialize it once.
pub use crate::util::init_tracing_once;
