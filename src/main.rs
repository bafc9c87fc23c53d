use anyhow::{anyhow, Context, Result};
use docdedupe::{init_tracing_once, DedupeOptions, Deduper, HttpStore, WindowSpec};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

fn main() -> ExitCode {
    init_tracing_once();

    let opts = match options_from_env() {
        Ok(opts) => opts,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::from(2);
        }
    };
    let url = std::env::var("DEDUPE_URL").unwrap_or_else(|_| "http://localhost:9200".to_string());
    let store = match HttpStore::new(&url) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(url = %url, error = %e, "cannot build store client");
            return ExitCode::from(1);
        }
    };

    let dedupe = Deduper::new(opts);
    let result = match std::env::var("DEDUPE_CHECK_LOG") {
        Ok(path) => dedupe
            .check_log_file(&store, &PathBuf::from(path))
            .map(|_| ()),
        Err(_) => dedupe.run(&store).map(|_| ()),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn options_from_env() -> Result<DedupeOptions> {
    let index = env_str("DEDUPE_INDEX").context("DEDUPE_INDEX is required")?;
    let fields = env_str("DEDUPE_FIELDS").context("DEDUPE_FIELDS is required (comma-separated)")?;
    let key_fields: Vec<String> = fields
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let mut opts = DedupeOptions::default()
        .with_index(index)
        .with_key_fields(key_fields);

    if let Some(doc_type) = env_str("DEDUPE_DOC_TYPE") {
        opts = opts.with_doc_type(doc_type);
    }
    if let Some(n) = env_parse::<usize>("DEDUPE_PAGE_SIZE")? {
        opts = opts.with_page_size(n);
    }
    if let Some(n) = env_parse::<usize>("DEDUPE_FLUSH")? {
        opts = opts.with_flush(n);
    }
    if let Some(n) = env_parse::<usize>("DEDUPE_THREADS")? {
        opts = opts.with_threads(n);
    }
    if let Some(n) = env_parse::<u32>("DEDUPE_MAX_RETRIES")? {
        opts = opts.with_max_retries(n);
    }
    if let Some(n) = env_parse::<u64>("DEDUPE_INITIAL_BACKOFF")? {
        opts = opts.with_initial_backoff_secs(n);
    }
    if let Some(n) = env_parse::<u64>("DEDUPE_TIMEOUT")? {
        opts = opts.with_request_timeout(Duration::from_secs(n));
    }
    if let Some(n) = env_parse::<u64>("DEDUPE_SLEEP")? {
        opts = opts.with_batch_pause(Duration::from_secs(n));
    }
    if let Some(w) = env_str("DEDUPE_WINDOW") {
        let spec = w
            .parse::<WindowSpec>()
            .map_err(|e| anyhow!("DEDUPE_WINDOW={w}: {e}"))?;
        opts = opts.with_window(spec);
    }
    if let Some(field) = env_str("DEDUPE_TIMESTAMP_FIELD") {
        opts = opts.with_timestamp_field(field);
    }
    let since = match env_str("DEDUPE_SINCE") {
        Some(s) => Some(parse_ts("DEDUPE_SINCE", &s)?),
        None => None,
    };
    let until = match env_str("DEDUPE_UNTIL") {
        Some(s) => Some(parse_ts("DEDUPE_UNTIL", &s)?),
        None => None,
    };
    opts = opts.with_time_range(since, until);
    if let Some(p) = env_str("DEDUPE_PENDING_LOG") {
        opts = opts.with_pending_log(p);
    }
    if let Some(p) = env_str("DEDUPE_DONE_LOG") {
        opts = opts.with_done_log(p);
    }
    if let Some(p) = env_str("DEDUPE_LOG_DUPL") {
        opts = opts.with_mapping_path(p);
    }
    Ok(opts
        .with_block_writes(env_flag("DEDUPE_BLOCK_WRITES"))
        .with_noop(env_flag("DEDUPE_NOOP"))
        .with_fail_fast(env_flag("DEDUPE_FAIL_FAST"))
        .with_check(!env_flag("DEDUPE_NO_CHECK"))
        .with_progress(!env_flag("DEDUPE_NO_PROGRESS")))
}

fn env_str(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn env_flag(name: &str) -> bool {
    matches!(
        env_str(name).as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_str(name) {
        Some(s) => s
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("{name}={s}: {e}")),
        None => Ok(None),
    }
}

fn parse_ts(name: &str, s: &str) -> Result<OffsetDateTime> {
    if let Ok(ts) = OffsetDateTime::parse(s, &Rfc3339) {
        return Ok(ts);
    }
    // offset-less timestamps like 2021-01-01T01:00:00 are taken as UTC
    let bare = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    PrimitiveDateTime::parse(s, bare)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|e| anyhow!("{name}={s}: {e}"))
}
