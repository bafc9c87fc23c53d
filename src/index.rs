use crate::key::DedupKey;
use crate::store::DeleteOp;
use ahash::AHashMap;

/// In-memory mapping from dedup key to the document ids sharing it, in scan
/// arrival order. One instance lives per scan cycle and is dropped with it,
/// which is what bounds memory across long multi-window jobs.
#[derive(Default)]
pub struct HashIndex {
    buckets: AHashMap<DedupKey, Vec<String>>,
    scanned: u64,
}

impl HashIndex {
    pub fn new() -> Self {
        Self {
            buckets: AHashMap::with_capacity(64_000),
            scanned: 0,
        }
    }

    pub fn insert(&mut self, key: DedupKey, id: String) {
        self.buckets.entry(key).or_default().push(id);
        self.scanned += 1;
    }

    pub fn scanned(&self) -> u64 {
        self.scanned
    }

    pub fn unique_keys(&self) -> u64 {
        self.buckets.len() as u64
    }

    /// Total removable documents: every bucket keeps its first arrival.
    pub fn duplicates(&self) -> u64 {
        self.buckets
            .values()
            .map(|ids| (ids.len() as u64).saturating_sub(1))
            .sum()
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&DedupKey, &[String])> {
        self.buckets.iter().map(|(k, ids)| (k, ids.as_slice()))
    }

    fn duplicate_buckets(&self) -> impl Iterator<Item = (&DedupKey, &[String])> {
        self.buckets().filter(|(_, ids)| ids.len() > 1)
    }

    /// Delete ops for the 2nd..Nth arrival of every duplicated bucket. Lazy;
    /// nothing is materialized until the pipeline drains it.
    pub fn delete_ops<'a>(
        &'a self,
        index: &'a str,
        doc_type: Option<&'a str>,
    ) -> impl Iterator<Item = DeleteOp> + 'a {
        self.duplicate_buckets().flat_map(move |(_, ids)| {
            ids[1..].iter().map(move |id| DeleteOp {
                index: index.to_string(),
                id: id.clone(),
                doc_type: doc_type.map(str::to_string),
            })
        })
    }

    /// The retained (first-arrived) id of every duplicated bucket, with its key.
    pub fn survivors(&self) -> impl Iterator<Item = (&DedupKey, &str)> {
        self.duplicate_buckets().map(|(k, ids)| (k, ids[0].as_str()))
    }
}
