//! Record Loader
//!
//! Turns an exported survey dump into a flat, ordered list of
//! `RawSubmission`s. Input is either a JSON document of arbitrary shape
//! (lists, wrapper objects, per-participant containers) or a flat CSV export.
//!
//! # Traversal
//! Explicit recursive descent over `serde_json::Value` with a depth bound.
//! A mapping is a *candidate* when it carries a participant-id alias, a
//! textual section-key alias, or an item-shaped key. A candidate's payload
//! children are flattened into its answers unless they hold records of their
//! own (mappings with an id or section alias); those, like every other
//! container child, are descended into with the candidate's participant id.
//! Non-candidate containers are descended into.
//!
//! Output order is traversal order; `sequence_index` records it and serves as
//! the Resolver's final tie-break.

use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{EngineError, EngineResult};
use crate::model::{Payload, RawSubmission};
use chrono::{DateTime, Utc};
use rmsa_common::time::parse_timestamp_value;
use rmsa_common::StudyDesign;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Participant-id aliases, in priority order
pub const PID_KEYS: &[&str] = &[
    "participant_id",
    "participantId",
    "participant_code",
    "participantCode",
    "pid",
    "code",
];

/// Section-key aliases, in priority order
pub const SECTION_KEYS: &[&str] = &[
    "section_key",
    "sectionKey",
    "section",
    "section_id",
    "sectionId",
    "page",
    "step",
    "form",
];

/// Payload aliases, in merge order
pub const PAYLOAD_KEYS: &[&str] = &[
    "payload", "data", "answers", "responses", "response", "fields", "values",
];

/// Timestamp aliases, tried in order until one parses
pub const TS_KEYS: &[&str] = &[
    "updated_at",
    "updatedAt",
    "created_at",
    "createdAt",
    "timestamp",
    "saved_at",
    "savedAt",
    "time",
];

const ANSWER_ID_KEYS: &[&str] = &["id", "qid", "name"];
const ANSWER_VALUE_KEYS: &[&str] = &["value", "answer", "response"];

/// Item-code shape: letters, underscore, digits (e.g. `A_1`, `B_12`)
pub fn is_item_shaped(key: &str) -> bool {
    match key.split_once('_') {
        Some((prefix, digits)) => {
            !prefix.is_empty()
                && prefix.chars().all(|c| c.is_ascii_alphabetic())
                && !digits.is_empty()
                && digits.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Loader over one study design
pub struct RecordLoader<'a> {
    design: &'a StudyDesign,
    max_depth: usize,
    auxiliary_keys: BTreeSet<String>,
}

/// Candidate assembled from one mapping node
struct Candidate {
    participant_id: Option<String>,
    section_key: Option<String>,
    payload: Payload,
    timestamp: Option<DateTime<Utc>>,
}

impl<'a> RecordLoader<'a> {
    pub fn new(design: &'a StudyDesign, max_depth: usize) -> Self {
        Self {
            design,
            max_depth,
            auxiliary_keys: design.auxiliary_keys(),
        }
    }

    /// Load a file; `.csv` is read as a flat table, anything else as JSON
    pub fn load_path(&self, path: &Path, diag: &mut Diagnostics) -> EngineResult<Vec<RawSubmission>> {
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);

        let file = std::fs::File::open(path).map_err(|e| {
            EngineError::FatalInput(format!("cannot open {}: {}", path.display(), e))
        })?;

        if is_csv {
            self.load_csv_reader(file, diag)
        } else {
            let value: Value = serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| {
                EngineError::FatalInput(format!("{} is not valid JSON: {}", path.display(), e))
            })?;
            Ok(self.load_value(&value, diag))
        }
    }

    /// Parse JSON text and load it
    pub fn load_json_str(&self, text: &str, diag: &mut Diagnostics) -> EngineResult<Vec<RawSubmission>> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| EngineError::FatalInput(format!("input is not valid JSON: {}", e)))?;
        Ok(self.load_value(&value, diag))
    }

    /// Load from an already-parsed JSON document
    pub fn load_value(&self, value: &Value, diag: &mut Diagnostics) -> Vec<RawSubmission> {
        let mut found = Vec::new();
        self.visit(value, 0, None, &mut found, diag);
        self.finish(found, diag)
    }

    /// Load a flat CSV export: one candidate per row
    pub fn load_csv_reader<R: Read>(&self, reader: R, diag: &mut Diagnostics) -> EngineResult<Vec<RawSubmission>> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = rdr
            .headers()
            .map_err(|e| EngineError::FatalInput(format!("unreadable CSV header: {}", e)))?
            .clone();

        let mut found = Vec::new();
        for (row_idx, row) in rdr.records().enumerate() {
            let row = row.map_err(|e| {
                EngineError::FatalInput(format!("unreadable CSV row {}: {}", row_idx + 1, e))
            })?;

            let mut map = Map::new();
            for (header, cell) in headers.iter().zip(row.iter()) {
                let cell = cell.trim();
                if cell.is_empty() {
                    continue;
                }
                map.insert(header.trim().to_string(), csv_cell_value(cell));
            }
            found.push(self.candidate(&map, None));
        }

        Ok(self.finish(found, diag))
    }

    fn visit(
        &self,
        value: &Value,
        depth: usize,
        inherited_pid: Option<&str>,
        found: &mut Vec<Candidate>,
        diag: &mut Diagnostics,
    ) {
        if depth > self.max_depth {
            diag.push(
                WarningKind::RecordSkipped,
                format!("Input nested deeper than {} levels; subtree skipped", self.max_depth),
            );
            return;
        }

        match value {
            Value::Array(items) => {
                for item in items {
                    self.visit(item, depth + 1, inherited_pid, found, diag);
                }
            }
            Value::Object(map) => {
                if !self.is_candidate(map) {
                    for child in map.values() {
                        self.visit(child, depth + 1, inherited_pid, found, diag);
                    }
                    return;
                }

                let candidate = self.candidate(map, inherited_pid);
                let pid = candidate.participant_id.clone();

                // Nested candidates below a participant container
                let mut nested = Vec::new();
                for (key, child) in map {
                    if PAYLOAD_KEYS.contains(&key.as_str()) && !holds_records(child) {
                        continue;
                    }
                    if child.is_object() || child.is_array() {
                        self.visit(child, depth + 1, pid.as_deref(), &mut nested, diag);
                    }
                }

                let is_container = candidate.section_key.is_none()
                    && candidate.payload.is_empty()
                    && !nested.is_empty();
                if is_container {
                    debug!(participant_id = ?pid, nested = nested.len(), "Participant container");
                } else {
                    found.push(candidate);
                }
                found.extend(nested);
            }
            _ => {}
        }
    }

    fn is_candidate(&self, map: &Map<String, Value>) -> bool {
        has_identity(map)
            || map
                .keys()
                .any(|k| is_item_shaped(k) || self.design.item(k).is_some())
    }

    fn candidate(&self, map: &Map<String, Value>, inherited_pid: Option<&str>) -> Candidate {
        let participant_id = first_text(map, PID_KEYS).or_else(|| inherited_pid.map(str::to_string));
        let section_key = first_string(map, SECTION_KEYS);
        let timestamp = TS_KEYS
            .iter()
            .filter_map(|k| map.get(*k))
            .find_map(parse_timestamp_value);

        Candidate {
            participant_id,
            section_key,
            payload: self.extract_payload(map),
            timestamp,
        }
    }

    /// Merge payload aliases, then item-shaped and auxiliary keys on the record
    fn extract_payload(&self, map: &Map<String, Value>) -> Payload {
        let mut payload = Payload::new();

        for key in PAYLOAD_KEYS {
            if let Some(block) = map.get(*key).filter(|b| !holds_records(b)) {
                ingest_answers(block, &mut payload);
            }
        }

        for (key, value) in map {
            if is_item_shaped(key) || self.auxiliary_keys.contains(key) {
                payload.entry(key.trim().to_string()).or_insert_with(|| value.clone());
            }
        }

        payload
    }

    /// Drop unidentifiable candidates and assign sequence indices
    fn finish(&self, found: Vec<Candidate>, diag: &mut Diagnostics) -> Vec<RawSubmission> {
        let total = found.len();
        let mut out = Vec::with_capacity(total);

        for (idx, candidate) in found.into_iter().enumerate() {
            match (candidate.participant_id, candidate.section_key) {
                (Some(participant_id), Some(section_key)) => {
                    let sequence_index = out.len();
                    out.push(RawSubmission {
                        participant_id,
                        section_key,
                        payload: candidate.payload,
                        timestamp: candidate.timestamp,
                        sequence_index,
                    });
                }
                (None, None) => diag.push(
                    WarningKind::RecordSkipped,
                    format!("Candidate #{} has neither participant id nor section key", idx + 1),
                ),
                (Some(pid), None) => diag.push(
                    WarningKind::RecordSkipped,
                    format!("Candidate #{} for participant {} has no section key", idx + 1, pid),
                ),
                (None, Some(section)) => diag.push(
                    WarningKind::RecordSkipped,
                    format!("Candidate #{} in section {} has no participant id", idx + 1, section),
                ),
            }
        }

        info!(candidates = total, submissions = out.len(), "Records loaded");
        out
    }
}

/// First alias whose value is a non-empty scalar, as trimmed text
fn first_text(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().filter_map(|k| map.get(*k)).find_map(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First alias whose value is a non-empty string, trimmed
fn first_string(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// A participant id or a textual section key identifies a record node
fn has_identity(map: &Map<String, Value>) -> bool {
    first_text(map, PID_KEYS).is_some() || first_string(map, SECTION_KEYS).is_some()
}

/// Payload-alias child that carries whole records rather than answers
///
/// `{"data": [{"section_key": ..}, ..]}` is a record list; `{"answers":
/// [{"id": "A_1", "value": 5}]}` and plain answer maps are not.
fn holds_records(block: &Value) -> bool {
    match block {
        Value::Object(obj) => has_identity(obj),
        Value::Array(items) => items
            .iter()
            .any(|item| item.as_object().is_some_and(has_identity)),
        _ => false,
    }
}

/// Flatten a payload block into `payload` without overwriting earlier keys
///
/// Accepts a plain mapping, a single `{id, value}` answer object, or a list of
/// either.
fn ingest_answers(block: &Value, payload: &mut Payload) {
    match block {
        Value::Object(obj) => {
            let id = ANSWER_ID_KEYS
                .iter()
                .filter_map(|k| obj.get(*k))
                .find_map(|v| v.as_str());
            let answer = ANSWER_VALUE_KEYS.iter().find_map(|k| obj.get(*k));

            match (id, answer) {
                (Some(id), Some(answer)) => {
                    payload
                        .entry(id.trim().to_string())
                        .or_insert_with(|| answer.clone());
                }
                _ => {
                    for (key, value) in obj {
                        payload.entry(key.trim().to_string()).or_insert_with(|| value.clone());
                    }
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                ingest_answers(item, payload);
            }
        }
        _ => {}
    }
}

/// CSV cells holding JSON containers (e.g. a serialized payload) are parsed
fn csv_cell_value(cell: &str) -> Value {
    if cell.starts_with('{') || cell.starts_with('[') {
        if let Ok(parsed) = serde_json::from_str::<Value>(cell) {
            return parsed;
        }
    }
    Value::String(cell.to_string())
}
