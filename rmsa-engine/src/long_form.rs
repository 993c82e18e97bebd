//! Long-Form Builder
//!
//! One row per (participant, condition, phase, item). Row order is fixed by
//! the design, not by payload key order: participants ascending, conditions in
//! declared order, `pre` before `post`, items in declared order, then the
//! participant's end-of-session rows.

use crate::blocks::{BlockObservation, BlockPositions};
use crate::classifier::ClassifiedRecord;
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::model::{value_text, CanonicalRecord};
use rmsa_common::{Phase, StudyDesign};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// One row of the canonical long table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongRow {
    pub participant_id: String,
    pub condition: String,
    pub phase: Phase,
    pub item: String,
    pub value: Option<f64>,
    pub construct: Option<String>,
    pub block_position: Option<usize>,
}

/// Build the long table from block observations and end records
pub fn build(
    observations: &[BlockObservation],
    classified: &[ClassifiedRecord<'_>],
    positions: &BlockPositions,
    design: &StudyDesign,
    diag: &mut Diagnostics,
) -> Vec<LongRow> {
    let mut blocks: BTreeMap<&str, Vec<&BlockObservation>> = BTreeMap::new();
    for obs in observations {
        blocks.entry(obs.participant_id.as_str()).or_default().push(obs);
    }

    let mut ends: BTreeMap<&str, &CanonicalRecord> = BTreeMap::new();
    for entry in classified.iter().filter(|c| c.is_session("end")) {
        ends.insert(entry.record.participant_id(), entry.record);
    }

    let mut participants: Vec<&str> = blocks.keys().chain(ends.keys()).copied().collect();
    participants.sort_unstable();
    participants.dedup();

    let condition_rank = |code: &str| design.conditions.iter().position(|c| c.code == code);

    let mut rows = Vec::new();
    for pid in participants {
        if let Some(obs_list) = blocks.get_mut(pid) {
            obs_list.sort_by_key(|o| (condition_rank(&o.condition), o.phase));
            for obs in obs_list.iter() {
                push_block_rows(obs, positions, design, &mut rows);
            }
        }
        if let Some(end) = ends.get(pid) {
            push_end_rows(end, positions, design, diag, &mut rows);
        }
    }

    debug!(rows = rows.len(), "Long table built");
    rows
}

fn push_block_rows(
    obs: &BlockObservation,
    positions: &BlockPositions,
    design: &StudyDesign,
    rows: &mut Vec<LongRow>,
) {
    let block_position = positions.get(&obs.participant_id, &obs.condition);
    for (idx, item) in design.items.iter().enumerate() {
        if item.phase != obs.phase {
            continue;
        }
        rows.push(LongRow {
            participant_id: obs.participant_id.clone(),
            condition: obs.condition.clone(),
            phase: obs.phase,
            item: item.code.clone(),
            value: obs.values.get(idx).copied().flatten(),
            construct: design.construct_for_item(&item.code).map(|c| c.name.clone()),
            block_position,
        });
    }
}

fn push_end_rows(
    end: &CanonicalRecord,
    positions: &BlockPositions,
    design: &StudyDesign,
    diag: &mut Diagnostics,
    rows: &mut Vec<LongRow>,
) {
    let pid = end.participant_id();
    let row = |condition: &str, item: &str, value: Option<f64>| LongRow {
        participant_id: pid.to_string(),
        condition: condition.to_string(),
        phase: Phase::End,
        item: item.to_string(),
        value,
        construct: None,
        block_position: positions.get(pid, condition),
    };

    for condition in &design.conditions {
        let key = format!("{}{}", design.end.rank_prefix, condition.code);
        let Some(raw) = end.field(&key) else {
            continue;
        };
        match numeric(raw) {
            Some(rank) => rows.push(row(&condition.code, &design.end.rank_item, Some(rank))),
            None => diag.push(
                WarningKind::Coercion,
                format!("{} end {}={} is not numeric; rank row omitted", pid, key, raw),
            ),
        }
    }

    for field in &design.end.choice_fields {
        let Some(choice) = end.field(field).and_then(value_text) else {
            continue;
        };
        if design.is_condition(&choice) {
            rows.push(row(&choice, field, Some(1.0)));
        } else {
            diag.push(
                WarningKind::UnknownVocabulary,
                format!(
                    "{} end {}={:?} names no condition; counted as unknown in end outcomes",
                    pid, field, choice
                ),
            );
        }
    }
}

/// Numeric value of a JSON number or numeric-looking string
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}
