//! HTTP binding of the store contract: scroll-paginated search, NDJSON bulk
//! deletes and batched exact-match multi-search.

use crate::store::{
    ClusterInfo, DeleteOp, DeleteOutcome, DocStream, DocumentStore, ExactQuery, QueryHit,
    QueryOutcome, ScanRequest, ScannedDoc, StoreError, TimeFilter,
};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const INFO_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpStore {
    base: String,
    client: Client,
}

#[derive(Deserialize)]
struct InfoBody {
    cluster_name: String,
    version: InfoVersion,
}

#[derive(Deserialize)]
struct InfoVersion {
    number: String,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        let base = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { base, client })
    }

    fn post_json(&self, url: &str, body: &Value, timeout: Duration) -> Result<Value, StoreError> {
        let resp = self
            .client
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .map_err(map_transport)?;
        parse_response(resp)
    }

    fn post_ndjson(&self, url: &str, body: String, timeout: Duration) -> Result<Value, StoreError> {
        let resp = self
            .client
            .post(url)
            .timeout(timeout)
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .map_err(map_transport)?;
        parse_response(resp)
    }

    fn put_json(&self, url: &str, body: &Value, timeout: Duration) -> Result<Value, StoreError> {
        let resp = self
            .client
            .put(url)
            .timeout(timeout)
            .json(body)
            .send()
            .map_err(map_transport)?;
        parse_response(resp)
    }
}

impl DocumentStore for HttpStore {
    fn cluster_info(&self) -> Result<ClusterInfo, StoreError> {
        let resp = self
            .client
            .get(format!("{}/", self.base))
            .timeout(INFO_TIMEOUT)
            .send()
            .map_err(map_transport)?;
        let body = parse_response(resp)?;
        let info: InfoBody = serde_json::from_value(body)
            .map_err(|e| StoreError::Rejected(format!("unexpected info body: {e}")))?;
        Ok(ClusterInfo {
            cluster_name: info.cluster_name,
            version: info.version.number,
        })
    }

    fn scan(&self, request: &ScanRequest) -> Result<DocStream<'_>, StoreError> {
        let keep_alive = keep_alive_str(request.keep_alive);
        let url = format!(
            "{}/{}/_search?scroll={}",
            self.base, request.index, keep_alive
        );
        let body = json!({
            "size": request.page_size,
            "sort": ["_doc"],
            "query": scan_query(request.filter.as_ref())?,
        });
        let resp = self.post_json(&url, &body, request.timeout)?;
        let scroll_id = resp
            .get("_scroll_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let page = parse_hits(&resp);
        Ok(Box::new(Scroll {
            store: self,
            keep_alive,
            timeout: request.timeout,
            scroll_id,
            page: page.into_iter(),
            done: false,
        }))
    }

    fn bulk_delete(
        &self,
        ops: &[DeleteOp],
        timeout: Duration,
    ) -> Result<Vec<DeleteOutcome>, StoreError> {
        // refresh=wait_for: reads after this call observe the deletions
        let url = format!("{}/_bulk?refresh=wait_for", self.base);
        let mut body = String::with_capacity(ops.len() * 64);
        for op in ops {
            let mut action = Map::new();
            action.insert("_index".into(), json!(op.index));
            action.insert("_id".into(), json!(op.id));
            if let Some(t) = &op.doc_type {
                action.insert("_type".into(), json!(t));
            }
            let line = serde_json::to_string(&json!({ "delete": action }))
                .map_err(|e| StoreError::Rejected(e.to_string()))?;
            body.push_str(&line);
            body.push('\n');
        }
        let resp = self.post_ndjson(&url, body, timeout)?;
        if resp.get("errors").and_then(Value::as_bool).unwrap_or(false) {
            tracing::warn!("bulk response reported per-item errors");
        }
        let items = resp
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| StoreError::Rejected("bulk response missing items".into()))?;
        Ok(items
            .iter()
            .map(|item| {
                let d = item.get("delete").cloned().unwrap_or(Value::Null);
                let id = d
                    .get("_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                // older servers report `found`, newer ones `result: "deleted"`
                let found = match d.get("found").and_then(Value::as_bool) {
                    Some(f) => f,
                    None => d.get("result").and_then(Value::as_str) == Some("deleted"),
                };
                let shard_successes = d
                    .pointer("/_shards/successful")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                DeleteOutcome {
                    id,
                    found,
                    shard_successes,
                }
            })
            .collect())
    }

    fn multi_query(
        &self,
        queries: &[ExactQuery],
        timeout: Duration,
    ) -> Result<Vec<QueryOutcome>, StoreError> {
        let url = format!("{}/_msearch", self.base);
        let mut body = String::with_capacity(queries.len() * 96);
        for q in queries {
            let header = serde_json::to_string(&json!({ "index": q.index }))
                .map_err(|e| StoreError::Rejected(e.to_string()))?;
            let mut term = Map::new();
            term.insert(q.field.clone(), json!(q.value));
            let query = serde_json::to_string(&json!({
                "query": { "term": term },
                "_source": [q.field],
            }))
            .map_err(|e| StoreError::Rejected(e.to_string()))?;
            body.push_str(&header);
            body.push('\n');
            body.push_str(&query);
            body.push('\n');
        }
        let resp = self.post_ndjson(&url, body, timeout)?;
        let responses = resp
            .get("responses")
            .and_then(Value::as_array)
            .ok_or_else(|| StoreError::Rejected("multi-search response missing responses".into()))?;
        let mut outcomes = Vec::with_capacity(responses.len());
        for (r, q) in responses.iter().zip(queries) {
            if let Some(err) = r.get("error") {
                return Err(StoreError::Rejected(format!(
                    "multi-search item failed: {err}"
                )));
            }
            let hits_obj = r.get("hits").cloned().unwrap_or(Value::Null);
            let total = total_hits(&hits_obj);
            let hits = hits_obj
                .get("hits")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(|h| {
                            let id = h.get("_id")?.as_str()?.to_string();
                            let index = h
                                .get("_index")
                                .and_then(Value::as_str)
                                .unwrap_or(q.index.as_str())
                                .to_string();
                            let doc_type = h
                                .get("_type")
                                .and_then(Value::as_str)
                                .filter(|t| *t != "_doc")
                                .map(str::to_string);
                            let field_value = h
                                .get("_source")
                                .and_then(|s| s.get(&q.field))
                                .and_then(scalar_string);
                            Some(QueryHit {
                                id,
                                index,
                                doc_type,
                                field_value,
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            outcomes.push(QueryOutcome { total, hits });
        }
        Ok(outcomes)
    }

    fn set_index_writable(&self, index: &str, writable: bool) -> Result<(), StoreError> {
        let url = format!("{}/{}/_settings", self.base, index);
        let body = json!({ "index": { "blocks": { "write": !writable } } });
        self.put_json(&url, &body, INFO_TIMEOUT).map(|_| ())
    }
}

/// Scroll cursor over one consistent read view.
struct Scroll<'a> {
    store: &'a HttpStore,
    keep_alive: String,
    timeout: Duration,
    scroll_id: Option<String>,
    page: std::vec::IntoIter<ScannedDoc>,
    done: bool,
}

impl Iterator for Scroll<'_> {
    type Item = Result<ScannedDoc, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(doc) = self.page.next() {
                return Some(Ok(doc));
            }
            if self.done {
                return None;
            }
            let id = match &self.scroll_id {
                Some(id) => id.clone(),
                None => {
                    self.done = true;
                    return None;
                }
            };
            let url = format!("{}/_search/scroll", self.store.base);
            let body = json!({ "scroll": self.keep_alive, "scroll_id": id });
            match self.store.post_json(&url, &body, self.timeout) {
                Ok(resp) => {
                    self.scroll_id = resp
                        .get("_scroll_id")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    let docs = parse_hits(&resp);
                    if docs.is_empty() {
                        self.done = true;
                        return None;
                    }
                    self.page = docs.into_iter();
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl Drop for Scroll<'_> {
    // release the server-side cursor, best effort
    fn drop(&mut self) {
        if let Some(id) = self.scroll_id.take() {
            let url = format!("{}/_search/scroll", self.store.base);
            let _ = self
                .store
                .client
                .delete(url)
                .timeout(self.timeout)
                .json(&json!({ "scroll_id": id }))
                .send();
        }
    }
}

fn map_transport(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout
    } else {
        StoreError::Unavailable(e.to_string())
    }
}

fn parse_response(resp: reqwest::blocking::Response) -> Result<Value, StoreError> {
    let status = resp.status();
    let text = resp.text().map_err(map_transport)?;
    if !status.is_success() {
        return Err(StoreError::Rejected(format!("HTTP {status}: {text}")));
    }
    serde_json::from_str(&text)
        .map_err(|e| StoreError::Rejected(format!("invalid response body: {e}")))
}

fn scan_query(filter: Option<&TimeFilter>) -> Result<Value, StoreError> {
    match filter {
        Some(f) => {
            let mut range = Map::new();
            range.insert("format".into(), json!("strict_date_optional_time"));
            if let Some(since) = f.since {
                range.insert("gte".into(), json!(format_ts(since)?));
            }
            if let Some(until) = f.until {
                range.insert("lt".into(), json!(format_ts(until)?));
            }
            let mut by_field = Map::new();
            by_field.insert(f.field.clone(), Value::Object(range));
            Ok(json!({ "bool": { "filter": [{ "range": by_field }] } }))
        }
        None => Ok(json!({ "match_all": {} })),
    }
}

fn format_ts(ts: OffsetDateTime) -> Result<String, StoreError> {
    ts.format(&Rfc3339)
        .map_err(|e| StoreError::Rejected(format!("cannot format timestamp: {e}")))
}

fn keep_alive_str(keep_alive: Duration) -> String {
    format!("{}s", keep_alive.as_secs().max(1))
}

fn parse_hits(resp: &Value) -> Vec<ScannedDoc> {
    resp.pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|h| {
                    let id = h.get("_id")?.as_str()?.to_string();
                    let source = h.get("_source").cloned().unwrap_or(Value::Null);
                    Some(ScannedDoc { id, source })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Total hit count; newer servers wrap it as `{"value": n, "relation": ...}`.
fn total_hits(hits: &Value) -> u64 {
    match hits.get("total") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::Object(o)) => o.get("value").and_then(Value::as_u64).unwrap_or(0),
        _ => 0,
    }
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
