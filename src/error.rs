use crate::store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Engine error taxonomy. Fatal classes map to distinct exit codes so an
/// operator can tell a dead cluster from an inconsistent one.
#[derive(Debug, Error)]
pub enum DedupeError {
    /// Store unreachable at startup; nothing has been scanned or deleted yet.
    #[error("cannot reach document store: {0}")]
    Connectivity(#[source] StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A scanned document lacks a configured key field. The cycle fails rather
    /// than skipping the document, which would corrupt duplicate accounting.
    #[error("document '{doc_id}' has no value for key field '{field}'")]
    KeyFieldMissing { field: String, doc_id: String },

    /// Key fields must be scalar-comparable.
    #[error("key field '{field}' on document '{doc_id}' is not a scalar value")]
    KeyFieldNotScalar { field: String, doc_id: String },

    /// A bulk chunk exhausted its retries while running fail-fast.
    #[error("bulk chunk failed after {attempts} attempts: {source}")]
    ChunkFailed {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// The store answered fewer consistency queries than were sent. Proceeding
    /// would understate remaining duplicates, so the whole check aborts.
    #[error("store reported {reported} statuses for {queried} queried keys")]
    ConsistencyWarning { queried: u64, reported: u64 },

    #[error("cannot read check log {path:?}: {source}")]
    CheckLogUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DedupeError {
    /// Process exit code for this error. Normal completion exits zero.
    pub fn exit_code(&self) -> i32 {
        match self {
            DedupeError::Connectivity(_) => 1,
            DedupeError::ConsistencyWarning { .. } => 3,
            DedupeError::CheckLogUnreadable { .. } => 4,
            _ => 2,
        }
    }
}
