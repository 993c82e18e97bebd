//! Submission record types shared by the Loader and Resolver

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Answer map of one submission (field code -> raw JSON value)
pub type Payload = BTreeMap<String, Value>;

/// One normalized submission as exported by the survey backend
///
/// Immutable once produced by the loader.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawSubmission {
    pub participant_id: String,
    pub section_key: String,
    pub payload: Payload,
    /// Parsed save time; `None` when absent or unparsable
    pub timestamp: Option<DateTime<Utc>>,
    /// Position in original traversal order
    pub sequence_index: usize,
}

impl RawSubmission {
    /// Resolution key
    pub fn key(&self) -> (&str, &str) {
        (&self.participant_id, &self.section_key)
    }

    /// Field value, treating JSON null as absent
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name).filter(|v| !v.is_null())
    }
}

/// The single surviving submission per `(participant_id, section_key)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub submission: RawSubmission,
    /// Number of candidates collapsed into this record (>= 1)
    pub candidates: usize,
}

impl CanonicalRecord {
    pub fn participant_id(&self) -> &str {
        &self.submission.participant_id
    }

    pub fn section_key(&self) -> &str {
        &self.submission.section_key
    }

    pub fn payload(&self) -> &Payload {
        &self.submission.payload
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.submission.timestamp
    }

    pub fn sequence_index(&self) -> usize {
        self.submission.sequence_index
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.submission.field(name)
    }
}

/// Render a scalar JSON value as text (lists joined with "; ")
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        }
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("; "))
            }
        }
        Value::Object(_) => Some(value.to_string()),
    }
}
