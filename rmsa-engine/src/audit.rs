//! Missingness & Integrity Auditor
//!
//! Read-only checks over the derived tables. Nothing here alters data or stops
//! the run; every finding becomes a warning in `Diagnostics` and, where it
//! has a tabular form, a row in the audit tables.
//!
//! # Checks
//! - Missing Likert responses per (participant, condition, phase, item), with a
//!   `__TOTAL__` roll-up row per block
//! - Observed blocks vs. participants x conditions
//! - Declared block order: must decode to each condition exactly once, and a
//!   valid declaration should agree with the timestamp-derived positions
//! - Parameter-influence labels outside the controlled vocabulary

use crate::blocks::BlockPositions;
use crate::classifier::ClassifiedRecord;
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::long_form::LongRow;
use crate::model::{value_text, CanonicalRecord};
use crate::wide_form::WideRow;
use rmsa_common::design::OTHER_PARAM;
use rmsa_common::{Phase, StudyDesign};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Item label of the per-block roll-up row
pub const TOTAL_ITEM: &str = "__TOTAL__";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingnessRow {
    pub participant_id: String,
    pub condition: String,
    pub phase: Phase,
    pub item: String,
    pub n_missing: usize,
    pub n_total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamCountRow {
    pub condition: String,
    pub parameter: String,
    pub count: usize,
    /// Share of all mentions within the condition
    pub percent: f64,
    pub known: bool,
}

/// Audit tables and headline counts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditReport {
    pub missingness: Vec<MissingnessRow>,
    pub param_counts: Vec<ParamCountRow>,
    pub participants: usize,
    pub expected_blocks: usize,
    pub observed_blocks: usize,
    pub missing_responses: usize,
    pub total_responses: usize,
}

pub struct IntegrityAuditor<'a> {
    design: &'a StudyDesign,
}

impl<'a> IntegrityAuditor<'a> {
    pub fn new(design: &'a StudyDesign) -> Self {
        Self { design }
    }

    /// Run every check
    pub fn audit(
        &self,
        records: &[CanonicalRecord],
        classified: &[ClassifiedRecord<'_>],
        long: &[LongRow],
        wide: &[WideRow],
        positions: &BlockPositions,
        diag: &mut Diagnostics,
    ) -> AuditReport {
        let missingness = self.missingness(long);
        let (missing_responses, total_responses) = missingness
            .iter()
            .filter(|r| r.item == TOTAL_ITEM)
            .fold((0, 0), |(m, t), r| (m + r.n_missing, t + r.n_total));
        if missing_responses > 0 {
            let blocks = missingness
                .iter()
                .filter(|r| r.item == TOTAL_ITEM && r.n_missing > 0)
                .count();
            diag.push(
                WarningKind::Missingness,
                format!(
                    "{} of {} Likert responses missing across {} block(s)",
                    missing_responses, total_responses, blocks
                ),
            );
        }

        let (participants, expected_blocks, observed_blocks) = self.check_block_count(records, wide, diag);
        self.check_orders(classified, positions, diag);
        let param_counts = self.param_counts(classified, diag);

        info!(
            participants,
            expected_blocks,
            observed_blocks,
            missing_responses,
            "Integrity audit complete"
        );

        AuditReport {
            missingness,
            param_counts,
            participants,
            expected_blocks,
            observed_blocks,
            missing_responses,
            total_responses,
        }
    }

    /// Missing counts per block item plus one `__TOTAL__` row per block
    pub fn missingness(&self, long: &[LongRow]) -> Vec<MissingnessRow> {
        let mut out: Vec<MissingnessRow> = Vec::new();
        let mut total: Option<MissingnessRow> = None;

        for row in long.iter().filter(|r| r.phase != Phase::End) {
            let same_block = total.as_ref().is_some_and(|t| {
                t.participant_id == row.participant_id && t.condition == row.condition && t.phase == row.phase
            });
            if !same_block {
                out.extend(total.take());
                total = Some(MissingnessRow {
                    participant_id: row.participant_id.clone(),
                    condition: row.condition.clone(),
                    phase: row.phase,
                    item: TOTAL_ITEM.to_string(),
                    n_missing: 0,
                    n_total: 0,
                });
            }

            let missing = usize::from(row.value.is_none());
            if let Some(t) = total.as_mut() {
                t.n_missing += missing;
                t.n_total += 1;
            }
            out.push(MissingnessRow {
                participant_id: row.participant_id.clone(),
                condition: row.condition.clone(),
                phase: row.phase,
                item: row.item.clone(),
                n_missing: missing,
                n_total: 1,
            });
        }
        out.extend(total);
        out
    }

    /// Compare distinct (participant, condition) blocks against the full design
    ///
    /// Returns `(participants, expected, observed)`.
    pub fn check_block_count(
        &self,
        records: &[CanonicalRecord],
        wide: &[WideRow],
        diag: &mut Diagnostics,
    ) -> (usize, usize, usize) {
        let participants: BTreeSet<&str> = records.iter().map(|r| r.participant_id()).collect();
        let expected = participants.len() * self.design.conditions.len();
        let observed = wide.len();

        if expected != observed {
            let mut detail = Vec::new();
            for pid in &participants {
                let missing: Vec<&str> = self
                    .design
                    .conditions
                    .iter()
                    .map(|c| c.code.as_str())
                    .filter(|c| !wide.iter().any(|w| w.participant_id == *pid && w.condition == *c))
                    .collect();
                if !missing.is_empty() {
                    detail.push(format!("{} lacks {}", pid, missing.join("/")));
                }
            }
            diag.push(
                WarningKind::BlockCount,
                format!(
                    "Expected {} blocks ({} participants x {} conditions), found {}: {}",
                    expected,
                    participants.len(),
                    self.design.conditions.len(),
                    observed,
                    detail.join(", ")
                ),
            );
        }

        (participants.len(), expected, observed)
    }

    /// Validate `meta.order` declarations and compare them with block positions
    pub fn check_orders(
        &self,
        classified: &[ClassifiedRecord<'_>],
        positions: &BlockPositions,
        diag: &mut Diagnostics,
    ) {
        for entry in classified.iter().filter(|c| c.is_session("meta")) {
            let record = entry.record;
            let Some(raw) = record.field(&self.design.order_field) else {
                continue;
            };
            let pid = record.participant_id();
            let declared = decode_order(raw, self.design);

            if !self.is_complete_order(&declared) {
                diag.push(
                    WarningKind::OrderDeclaration,
                    format!(
                        "{} declared order {} decodes to [{}], expected each of {} once",
                        pid,
                        raw,
                        declared.join(", "),
                        self.design.condition_codes().join("/")
                    ),
                );
                continue;
            }

            let observed = positions.sequence(pid);
            let declared_seen: Vec<&str> = declared
                .iter()
                .map(String::as_str)
                .filter(|c| observed.contains(c))
                .collect();
            if declared_seen != observed {
                diag.push(
                    WarningKind::OrderMismatch,
                    format!(
                        "{} declared order {} but blocks were saved as {}",
                        pid,
                        declared.join("-"),
                        observed.join("-")
                    ),
                );
            }
        }
    }

    fn is_complete_order(&self, declared: &[String]) -> bool {
        declared.len() == self.design.conditions.len()
            && self
                .design
                .conditions
                .iter()
                .all(|c| declared.iter().filter(|d| **d == c.code).count() == 1)
    }

    /// Tally post-phase parameter-influence selections per condition
    pub fn param_counts(&self, classified: &[ClassifiedRecord<'_>], diag: &mut Diagnostics) -> Vec<ParamCountRow> {
        let mut counts: BTreeMap<(usize, String), usize> = BTreeMap::new();

        for entry in classified {
            let Some((condition, Phase::Post)) = entry.block() else {
                continue;
            };
            let Some(col) = self.design.conditions.iter().position(|c| c.code == condition) else {
                continue;
            };
            let record = entry.record;

            let mut labels = record
                .field(&self.design.param_field)
                .map(normalize_param_list)
                .unwrap_or_default();
            if record
                .field(&self.design.param_other_field)
                .and_then(value_text)
                .is_some()
            {
                labels.push(OTHER_PARAM.to_string());
            }
            for label in labels {
                *counts.entry((col, label)).or_insert(0) += 1;
            }
        }

        let mut per_condition: BTreeMap<usize, usize> = BTreeMap::new();
        for ((col, _), n) in &counts {
            *per_condition.entry(*col).or_insert(0) += n;
        }

        let mut unknown: BTreeSet<&str> = BTreeSet::new();
        let rows = counts
            .iter()
            .map(|((col, label), &count)| {
                let known = self.design.is_known_param(label);
                if !known {
                    unknown.insert(label.as_str());
                }
                let total = per_condition.get(col).copied().unwrap_or(count).max(1);
                ParamCountRow {
                    condition: self.design.conditions[*col].code.clone(),
                    parameter: label.clone(),
                    count,
                    percent: count as f64 / total as f64 * 100.0,
                    known,
                }
            })
            .collect();

        for label in unknown {
            diag.push(
                WarningKind::UnknownVocabulary,
                format!("Unknown parameter name: {}", label),
            );
        }
        rows
    }
}

/// Decode a declared order (`"B-A-C"`, `"BAC"`, `["B", "A", "C"]`) into codes
///
/// With single-character condition codes every matching character counts;
/// otherwise the text is split on non-alphanumeric separators.
pub fn decode_order(raw: &Value, design: &StudyDesign) -> Vec<String> {
    let Some(text) = value_text(raw) else {
        return Vec::new();
    };

    if design.conditions.iter().all(|c| c.code.chars().count() == 1) {
        text.chars()
            .map(|ch| ch.to_string())
            .filter(|s| design.is_condition(s))
            .collect()
    } else {
        text.split(|ch: char| !ch.is_alphanumeric())
            .filter(|s| design.is_condition(s))
            .map(str::to_string)
            .collect()
    }
}

/// Multi-select value as a label list
///
/// Accepts a JSON list, a string holding a JSON (or single-quoted) list, or a
/// comma-separated string.
pub fn normalize_param_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_text).collect(),
        Value::String(s) => {
            let s = s.trim();
            if s.starts_with('[') && s.ends_with(']') {
                if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(s) {
                    return items.iter().filter_map(value_text).collect();
                }
                return split_labels(&s[1..s.len() - 1]);
            }
            split_labels(s)
        }
        other => value_text(other).into_iter().collect(),
    }
}

fn split_labels(s: &str) -> Vec<String> {
    s.split(',')
        .map(|part| part.trim().trim_matches(|c| c == '\'' || c == '"').trim())
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Payload, RawSubmission};
    use crate::{blocks, classifier};
    use serde_json::json;

    fn record(pid: &str, section: &str, payload: Value, ts: Option<i64>, seq: usize) -> CanonicalRecord {
        use chrono::TimeZone;
        let payload: Payload = serde_json::from_value(payload).unwrap();
        CanonicalRecord {
            submission: RawSubmission {
                participant_id: pid.to_string(),
                section_key: section.to_string(),
                payload,
                timestamp: ts.map(|t| chrono::Utc.timestamp_opt(t, 0).unwrap()),
                sequence_index: seq,
            },
            candidates: 1,
        }
    }

    #[test]
    fn test_decode_order_variants() {
        let design = StudyDesign::builtin();
        assert_eq!(decode_order(&json!("B-A-C"), &design), vec!["B", "A", "C"]);
        assert_eq!(decode_order(&json!("cab"), &design), Vec::<String>::new());
        assert_eq!(decode_order(&json!(["C", "A", "B"]), &design), vec!["C", "A", "B"]);
        assert_eq!(decode_order(&json!("A-A-B"), &design), vec!["A", "A", "B"]);
    }

    #[test]
    fn test_normalize_param_list() {
        assert_eq!(normalize_param_list(&json!(["Rate", " Scale "])), vec!["Rate", "Scale"]);
        assert_eq!(normalize_param_list(&json!("[\"Rate\",\"Scale\"]")), vec!["Rate", "Scale"]);
        assert_eq!(normalize_param_list(&json!("['Rate', 'Loop Length']")), vec!["Rate", "Loop Length"]);
        assert_eq!(normalize_param_list(&json!("Rate, Scale,")), vec!["Rate", "Scale"]);
        assert_eq!(normalize_param_list(&json!("Rate")), vec!["Rate"]);
        assert!(normalize_param_list(&json!("")).is_empty());
    }

    #[test]
    fn test_missingness_rolls_up_per_block() {
        let design = StudyDesign::builtin();
        let mut diag = Diagnostics::new();
        let records = vec![record("P1", "block_A_pre", json!({"A_1": 4, "A_2": 5}), None, 0)];
        let classified = classifier::classify(&records, &design, &mut diag);
        let obs = blocks::observe(&classified, &design, &mut diag);
        let positions = BlockPositions::compute(&obs);
        let long = crate::long_form::build(&obs, &classified, &positions, &design, &mut diag);

        let rows = IntegrityAuditor::new(&design).missingness(&long);
        assert_eq!(rows.len(), 8);
        let total = rows.last().unwrap();
        assert_eq!(total.item, TOTAL_ITEM);
        assert_eq!((total.n_missing, total.n_total), (5, 7));
    }

    #[test]
    fn test_order_checks() {
        let design = StudyDesign::builtin();
        let mut diag = Diagnostics::new();
        let records = vec![
            record("P1", "block_A_pre", json!({}), Some(300), 0),
            record("P1", "block_B_pre", json!({}), Some(100), 1),
            record("P1", "block_C_pre", json!({}), Some(200), 2),
            record("P1", "meta", json!({"order": "B-C-A"}), None, 3),
            record("P2", "block_A_pre", json!({}), Some(100), 4),
            record("P2", "block_B_pre", json!({}), Some(200), 5),
            record("P2", "meta", json!({"order": "B-A-C"}), None, 6),
            record("P3", "meta", json!({"order": "AB"}), None, 7),
        ];
        let classified = classifier::classify(&records, &design, &mut diag);
        let obs = blocks::observe(&classified, &design, &mut diag);
        let positions = BlockPositions::compute(&obs);

        IntegrityAuditor::new(&design).check_orders(&classified, &positions, &mut diag);
        assert_eq!(diag.count(WarningKind::OrderDeclaration), 1);
        // P2 saved A before B against a declared B-A-C
        assert_eq!(diag.count(WarningKind::OrderMismatch), 1);
        assert!(diag.of_kind(WarningKind::OrderMismatch).all(|w| w.message.starts_with("P2")));
    }

    #[test]
    fn test_param_counts_flag_unknown_labels() {
        let design = StudyDesign::builtin();
        let mut diag = Diagnostics::new();
        let records = vec![
            record("P1", "block_A_post", json!({"param_influence": ["Rate", "Tempo"], "param_other": "density"}), None, 0),
            record("P2", "block_A_post", json!({"param_influence": "Rate"}), None, 1),
            record("P2", "block_A_pre", json!({"param_influence": "Scale"}), None, 2),
        ];
        let classified = classifier::classify(&records, &design, &mut diag);
        let rows = IntegrityAuditor::new(&design).param_counts(&classified, &mut diag);

        let rate = rows.iter().find(|r| r.parameter == "Rate").unwrap();
        assert_eq!(rate.count, 2);
        assert_eq!(rate.percent, 50.0);
        assert!(rows.iter().any(|r| r.parameter == OTHER_PARAM && r.known));
        assert!(rows.iter().any(|r| r.parameter == "Tempo" && !r.known));
        assert!(!rows.iter().any(|r| r.parameter == "Scale"));
        assert_eq!(diag.count(WarningKind::UnknownVocabulary), 1);
    }

    #[test]
    fn test_block_count_mismatch() {
        let design = StudyDesign::builtin();
        let mut diag = Diagnostics::new();
        let records = vec![
            record("P1", "block_A_pre", json!({}), None, 0),
            record("P1", "block_B_pre", json!({}), None, 1),
        ];
        let classified = classifier::classify(&records, &design, &mut diag);
        let obs = blocks::observe(&classified, &design, &mut diag);
        let positions = BlockPositions::compute(&obs);
        let wide = crate::wide_form::build(&obs, &positions, &design);

        let counts = IntegrityAuditor::new(&design).check_block_count(&records, &wide, &mut diag);
        assert_eq!(counts, (1, 3, 2));
        assert_eq!(diag.count(WarningKind::BlockCount), 1);
        assert!(diag.warnings()[0].message.contains("P1 lacks C"));
    }
}
