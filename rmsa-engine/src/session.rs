//! Session-level tables
//!
//! Participants, end-of-session outcomes, free-text notes and the construct
//! mapping. These sit beside the Likert pipeline and read the same canonical
//! records and long rows.

use crate::classifier::ClassifiedRecord;
use crate::long_form::LongRow;
use crate::model::{value_text, CanonicalRecord};
use rmsa_common::{Phase, StudyDesign};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Sections merged into the participants table, highest priority first
const PARTICIPANT_SECTIONS: &[&str] = &["meta", "background"];

/// Outcome label for first-place rankings
pub const BEST_OVERALL: &str = "best_overall";

/// Participants table with data-driven columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticipantsTable {
    /// `participant_id` first, then payload fields sorted
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndOutcomeRow {
    pub outcome: String,
    /// Condition code, or the raw label when a choice names no condition
    pub condition: String,
    pub count: usize,
    pub known: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualitativeNote {
    pub participant_id: String,
    pub condition: Option<String>,
    pub phase: Option<Phase>,
    pub field: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstructRow {
    pub construct: String,
    pub items: String,
    pub reversed: String,
    pub formula: String,
    pub interpretation: String,
}

/// One row per participant seen anywhere in the canonical records
pub fn participants(records: &[CanonicalRecord], classified: &[ClassifiedRecord<'_>]) -> ParticipantsTable {
    let mut merged: BTreeMap<&str, BTreeMap<String, String>> = BTreeMap::new();
    for record in records {
        merged.entry(record.participant_id()).or_default();
    }

    for section in PARTICIPANT_SECTIONS {
        for entry in classified.iter().filter(|c| c.is_session(section)) {
            let fields = merged.entry(entry.record.participant_id()).or_default();
            for (key, value) in entry.record.payload() {
                if value.is_object() {
                    continue;
                }
                if let Some(text) = value_text(value) {
                    fields.entry(key.clone()).or_insert(text);
                }
            }
        }
    }

    let keys: BTreeSet<&String> = merged.values().flat_map(|f| f.keys()).collect();
    let keys: Vec<&String> = keys.into_iter().filter(|k| *k != "participant_id").collect();

    let mut columns = vec!["participant_id".to_string()];
    columns.extend(keys.iter().map(|k| k.to_string()));

    let rows = merged
        .iter()
        .map(|(pid, fields)| {
            let mut row = vec![Some(pid.to_string())];
            row.extend(keys.iter().map(|k| fields.get(*k).cloned()));
            row
        })
        .collect();

    ParticipantsTable { columns, rows }
}

/// First-place rankings and single-choice selections per condition
///
/// Choices that name no condition never reach the long table; they are
/// counted here from the end records under their raw label with `known` unset.
pub fn end_outcomes(
    long: &[LongRow],
    classified: &[ClassifiedRecord<'_>],
    design: &StudyDesign,
) -> Vec<EndOutcomeRow> {
    // (outcome label, long-table item); a value of 1 marks first rank or the chosen condition
    let mut outcomes = vec![(BEST_OVERALL, design.end.rank_item.as_str())];
    outcomes.extend(design.end.choice_fields.iter().map(|f| (f.as_str(), f.as_str())));

    let mut rows = Vec::new();
    for (outcome, item) in outcomes {
        for condition in &design.conditions {
            let count = long
                .iter()
                .filter(|r| {
                    r.phase == Phase::End
                        && r.item == item
                        && r.condition == condition.code
                        && r.value == Some(1.0)
                })
                .count();
            rows.push(EndOutcomeRow {
                outcome: outcome.to_string(),
                condition: condition.code.clone(),
                count,
                known: true,
            });
        }
    }

    let mut unknown: BTreeMap<(&str, String), usize> = BTreeMap::new();
    for entry in classified.iter().filter(|c| c.is_session("end")) {
        for field in &design.end.choice_fields {
            let Some(choice) = entry.record.field(field).and_then(value_text) else {
                continue;
            };
            if !design.is_condition(&choice) {
                *unknown.entry((field.as_str(), choice)).or_insert(0) += 1;
            }
        }
    }
    rows.extend(unknown.into_iter().map(|((field, label), count)| EndOutcomeRow {
        outcome: field.to_string(),
        condition: label,
        count,
        known: false,
    }));
    rows
}

/// Free-text answers from block and end sections
pub fn qualitative_notes(classified: &[ClassifiedRecord<'_>], design: &StudyDesign) -> Vec<QualitativeNote> {
    let mut notes = Vec::new();

    for entry in classified {
        let (condition, phase, fields) = match entry.block() {
            Some((condition, phase)) => (Some(condition.to_string()), Some(phase), &design.block_text_fields),
            None if entry.is_session("end") => (None, Some(Phase::End), &design.end_text_fields),
            None => continue,
        };

        for field in fields {
            let Some(text) = entry.record.field(field).and_then(text_answer) else {
                continue;
            };
            notes.push(QualitativeNote {
                participant_id: entry.record.participant_id().to_string(),
                condition: condition.clone(),
                phase,
                field: field.clone(),
                text,
            });
        }
    }
    notes
}

fn text_answer(value: &Value) -> Option<String> {
    if value.is_object() {
        return None;
    }
    value_text(value)
}

/// Declarative construct table
pub fn constructs(design: &StudyDesign) -> Vec<ConstructRow> {
    design
        .constructs
        .iter()
        .map(|c| ConstructRow {
            construct: c.name.clone(),
            items: c.items.join("; "),
            reversed: c.reverse.join("; "),
            formula: c.formula.clone(),
            interpretation: c.interpretation.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier;
    use crate::diagnostics::Diagnostics;
    use crate::model::{Payload, RawSubmission};
    use serde_json::json;

    fn record(pid: &str, section: &str, payload: Value) -> CanonicalRecord {
        let payload: Payload = serde_json::from_value(payload).unwrap();
        CanonicalRecord {
            submission: RawSubmission {
                participant_id: pid.to_string(),
                section_key: section.to_string(),
                payload,
                timestamp: None,
                sequence_index: 0,
            },
            candidates: 1,
        }
    }

    #[test]
    fn test_participants_merge_meta_over_background() {
        let design = StudyDesign::builtin();
        let mut diag = Diagnostics::new();
        let records = vec![
            record("P1", "background", json!({"age_range": "25-34", "order": "A-B-C", "instruments": ["piano", "voice"]})),
            record("P1", "meta", json!({"order": "B-A-C", "nested": {"x": 1}})),
            record("P2", "block_A_pre", json!({})),
        ];
        let classified = classifier::classify(&records, &design, &mut diag);
        let table = participants(&records, &classified);

        assert_eq!(table.columns, vec!["participant_id", "age_range", "instruments", "order"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][2].as_deref(), Some("piano; voice"));
        assert_eq!(table.rows[0][3].as_deref(), Some("B-A-C"));
        assert_eq!(table.rows[1], vec![Some("P2".to_string()), None, None, None]);
    }

    #[test]
    fn test_end_outcomes_count_first_ranks_and_choices() {
        let design = StudyDesign::builtin();
        let mut diag = Diagnostics::new();
        let records = vec![
            record("P1", "end", json!({"most_intermedial": "B", "biggest_mismatch": "Z"})),
            record("P2", "end", json!({"biggest_mismatch": "Z"})),
        ];
        let classified = classifier::classify(&records, &design, &mut diag);
        let end = |pid: &str, condition: &str, item: &str, value: f64| LongRow {
            participant_id: pid.to_string(),
            condition: condition.to_string(),
            phase: Phase::End,
            item: item.to_string(),
            value: Some(value),
            construct: None,
            block_position: None,
        };
        let long = vec![
            end("P1", "A", "rank", 2.0),
            end("P1", "C", "rank", 1.0),
            end("P2", "C", "rank", 1.0),
            end("P1", "B", "most_intermedial", 1.0),
        ];
        let rows = end_outcomes(&long, &classified, &design);

        assert_eq!(rows.len(), 10);
        assert!(rows[..9].iter().all(|r| r.known));
        assert_eq!(
            rows[9],
            EndOutcomeRow {
                outcome: "biggest_mismatch".to_string(),
                condition: "Z".to_string(),
                count: 2,
                known: false,
            }
        );
        let get = |o: &str, c: &str| rows.iter().find(|r| r.outcome == o && r.condition == c).unwrap().count;
        assert_eq!(get(BEST_OVERALL, "C"), 2);
        assert_eq!(get(BEST_OVERALL, "A"), 0);
        assert_eq!(get("most_intermedial", "B"), 1);
        assert_eq!(get("biggest_mismatch", "B"), 0);
    }

    #[test]
    fn test_qualitative_notes() {
        let design = StudyDesign::builtin();
        let mut diag = Diagnostics::new();
        let records = vec![
            record("P1", "block_B_pre", json!({"aim": "  find loops ", "strategy": ""})),
            record("P1", "end", json!({"reflection": "fun"})),
        ];
        let classified = classifier::classify(&records, &design, &mut diag);
        let notes = qualitative_notes(&classified, &design);

        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].condition.as_deref(), Some("B"));
        assert_eq!(notes[0].text, "find loops");
        assert_eq!(notes[1].phase, Some(Phase::End));
        assert_eq!(notes[1].field, "reflection");
    }

    #[test]
    fn test_constructs_table() {
        let rows = constructs(&StudyDesign::builtin());
        assert_eq!(rows[0].reversed, "B_5; B_6");
        assert_eq!(rows[2].items, "B_7; B_8");
    }
}
