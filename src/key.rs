use crate::error::DedupeError;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Equality key derived from a document's field values. The single-field case
/// keeps the canonical string as-is; multiple fields collapse into a fixed
/// 128-bit digest of their concatenation in configured order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Value(String),
    Digest([u8; 16]),
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupKey::Value(s) => f.write_str(s),
            DedupKey::Digest(d) => f.write_str(&hex::encode(d)),
        }
    }
}

/// Derives the dedup key for one document from the configured fields.
pub struct KeyBuilder {
    fields: Vec<String>,
}

impl KeyBuilder {
    pub fn new(fields: Vec<String>) -> Self {
        assert!(!fields.is_empty(), "at least one key field is required");
        Self { fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Single-field keys are raw values; they can be re-queried exactly.
    /// Digest keys cannot.
    pub fn is_single(&self) -> bool {
        self.fields.len() == 1
    }

    pub fn key_for(&self, doc_id: &str, source: &Value) -> Result<DedupKey, DedupeError> {
        if self.fields.len() == 1 {
            return Ok(DedupKey::Value(canonical(doc_id, &self.fields[0], source)?));
        }
        let mut hasher = Sha256::new();
        for field in &self.fields {
            hasher.update(canonical(doc_id, field, source)?.as_bytes());
        }
        let digest = hasher.finalize();
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest[..16]);
        Ok(DedupKey::Digest(out))
    }
}

/// Canonical string form of a scalar field value. Missing and null fields fail
/// the cycle; silently skipping them would misreport duplicate counts.
fn canonical(doc_id: &str, field: &str, source: &Value) -> Result<String, DedupeError> {
    match source.get(field) {
        None | Some(Value::Null) => Err(DedupeError::KeyFieldMissing {
            field: field.to_string(),
            doc_id: doc_id.to_string(),
        }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(_) => Err(DedupeError::KeyFieldNotScalar {
            field: field.to_string(),
            doc_id: doc_id.to_string(),
        }),
    }
}
