//! Durable artifacts: the retained-document log consumed by the consistency
//! checker, and the optional key-to-ids mapping file.

use crate::index::HashIndex;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// One retained document, serialized as `<key>:<index>/<doc_type|->/<id>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetainedEntry {
    pub key_value: String,
    pub index: String,
    pub doc_type: Option<String>,
    pub id: String,
}

impl RetainedEntry {
    pub fn to_line(&self) -> String {
        format!(
            "{}:{}/{}/{}",
            self.key_value,
            self.index,
            self.doc_type.as_deref().unwrap_or("-"),
            self.id
        )
    }

    /// Keys may contain ':'; the locator after the last ':' never does.
    pub fn parse(line: &str) -> Option<Self> {
        let (key, locator) = line.rsplit_once(':')?;
        let mut parts = locator.splitn(3, '/');
        let index = parts.next()?;
        let doc_type = parts.next()?;
        let id = parts.next()?;
        if index.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self {
            key_value: key.to_string(),
            index: index.to_string(),
            doc_type: (doc_type != "-").then(|| doc_type.to_string()),
            id: id.to_string(),
        })
    }
}

/// Append entries to the log, one line each. Creates the file when absent.
pub fn append_entries(
    path: &Path,
    entries: impl IntoIterator<Item = RetainedEntry>,
) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut w = BufWriter::new(file);
    for entry in entries {
        writeln!(w, "{}", entry.to_line())?;
    }
    w.flush()
}

/// Read every well-formed entry; malformed lines are reported and skipped.
pub fn read_entries(path: &Path) -> io::Result<Vec<RetainedEntry>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match RetainedEntry::parse(&line) {
            Some(entry) => entries.push(entry),
            None => tracing::warn!(lineno = lineno + 1, line = %line, "invalid log line, skipping"),
        }
    }
    Ok(entries)
}

/// Write the full key-to-ids mapping as one JSON object, for audit/replay.
pub fn write_mapping(path: &Path, index: &HashIndex) -> io::Result<()> {
    let mut map = BTreeMap::new();
    for (key, ids) in index.buckets() {
        map.insert(key.to_string(), ids.to_vec());
    }
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    serde_json::to_writer(&mut w, &map).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    w.flush()
}
