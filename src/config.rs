use crate::error::DedupeError;
use crate::window::WindowSpec;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct DedupeOptions {
    pub index: String,
    pub key_fields: Vec<String>,          // ordered; >1 switches to digest keys
    pub doc_type: Option<String>,

    pub page_size: usize,                 // documents per scan page
    pub flush: usize,                     // ops per bulk chunk
    pub threads: usize,                   // delete workers; 1 = sequential
    pub max_retries: u32,
    pub initial_backoff_secs: u64,
    pub request_timeout: Duration,
    pub scroll_keep_alive: Duration,      // consistent read view lifetime
    pub batch_pause: Duration,            // pause after each destructive batch

    pub timestamp_field: Option<String>,
    pub since: Option<OffsetDateTime>,    // inclusive
    pub until: Option<OffsetDateTime>,    // exclusive
    pub window: Option<WindowSpec>,

    pub block_writes: bool,               // freeze external writers while scanning
    pub noop: bool,                       // compute and log only, delete nothing
    pub fail_fast: bool,                  // abort the run on an exhausted chunk
    pub check: bool,                      // run the consistency check after deleting
    pub pending_log: PathBuf,             // retained docs awaiting verification
    pub done_log: PathBuf,                // verified survivors
    pub mapping_path: Option<PathBuf>,    // optional key -> ids JSON dump

    pub progress: bool,
    pub mem_report_every: u64,            // log memory every N scanned docs, 0 = off
}

impl Default for DedupeOptions {
    fn default() -> Self {
        Self {
            index: String::new(),
            key_fields: Vec::new(),
            doc_type: None,

            page_size: 1000,
            flush: 500,
            threads: 1, // safe default, avoids overloading the store
            max_retries: 3,
            initial_backoff_secs: 2,
            request_timeout: Duration::from_secs(60),
            scroll_keep_alive: Duration::from_secs(600),
            batch_pause: Duration::from_secs(1),

            timestamp_field: None,
            since: None,
            until: None,
            window: None,

            block_writes: false,
            noop: false,
            fail_fast: false,
            check: true,
            pending_log: PathBuf::from("dedupe.pending"),
            done_log: PathBuf::from("dedupe.done"),
            mapping_path: None,

            progress: true,
            mem_report_every: 1_000_000,
        }
    }
}

impl DedupeOptions {
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }
    /// Single key field; the dedup key is the field's raw value.
    pub fn with_key_field(mut self, field: impl Into<String>) -> Self {
        self.key_fields = vec![field.into()];
        self
    }
    /// Multiple key fields, in order; the dedup key becomes a digest.
    pub fn with_key_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_fields = fields.into_iter().map(Into::into).collect();
        self
    }
    pub fn with_doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }
    pub fn with_page_size(mut self, n: usize) -> Self {
        self.page_size = n.max(1);
        self
    }
    pub fn with_flush(mut self, n: usize) -> Self {
        self.flush = n.max(1);
        self
    }
    pub fn with_threads(mut self, n: usize) -> Self {
        self.threads = n.max(1);
        self
    }
    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }
    pub fn with_initial_backoff_secs(mut self, secs: u64) -> Self {
        self.initial_backoff_secs = secs;
        self
    }
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
    pub fn with_scroll_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.scroll_keep_alive = keep_alive;
        self
    }
    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }
    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = Some(field.into());
        self
    }
    pub fn with_time_range(
        mut self,
        since: Option<OffsetDateTime>,
        until: Option<OffsetDateTime>,
    ) -> Self {
        self.since = since;
        self.until = until;
        self
    }
    pub fn with_window(mut self, window: WindowSpec) -> Self {
        self.window = Some(window);
        self
    }
    pub fn with_block_writes(mut self, yes: bool) -> Self {
        self.block_writes = yes;
        self
    }
    pub fn with_noop(mut self, yes: bool) -> Self {
        self.noop = yes;
        self
    }
    pub fn with_fail_fast(mut self, yes: bool) -> Self {
        self.fail_fast = yes;
        self
    }
    pub fn with_check(mut self, yes: bool) -> Self {
        self.check = yes;
        self
    }
    pub fn with_pending_log(mut self, path: impl AsRef<Path>) -> Self {
        self.pending_log = path.as_ref().to_path_buf();
        self
    }
    pub fn with_done_log(mut self, path: impl AsRef<Path>) -> Self {
        self.done_log = path.as_ref().to_path_buf();
        self
    }
    pub fn with_mapping_path(mut self, path: impl AsRef<Path>) -> Self {
        self.mapping_path = Some(path.as_ref().to_path_buf());
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_mem_report_every(mut self, every: u64) -> Self {
        self.mem_report_every = every;
        self
    }

    pub fn validate(&self) -> Result<(), DedupeError> {
        if self.index.trim().is_empty() {
            return Err(DedupeError::Config("index name is required".into()));
        }
        if self.key_fields.is_empty() {
            return Err(DedupeError::Config(
                "at least one key field is required".into(),
            ));
        }
        if self.page_size == 0 || self.flush == 0 {
            return Err(DedupeError::Config(
                "page size and flush size must be positive".into(),
            ));
        }
        if self.timestamp_field.is_none() && (self.since.is_some() || self.until.is_some()) {
            return Err(DedupeError::Config(
                "since/until bounds require a timestamp field".into(),
            ));
        }
        if self.window.is_some() {
            if self.timestamp_field.is_none() {
                return Err(DedupeError::Config(
                    "windowed runs require a timestamp field".into(),
                ));
            }
            if self.since.is_none() || self.until.is_none() {
                return Err(DedupeError::Config(
                    "windowed runs require both since and until bounds".into(),
                ));
            }
        }
        if let (Some(since), Some(until)) = (self.since, self.until) {
            if until <= since {
                return Err(DedupeError::Config("until must be after since".into()));
            }
        }
        Ok(())
    }
}
