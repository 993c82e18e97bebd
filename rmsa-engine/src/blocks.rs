//! Block observations and per-participant block positions
//!
//! Likert coercion happens exactly once, here: every downstream table reads
//! the coerced `values`, so a bad entry produces one `Coercion` warning no
//! matter how many tables it lands in.

use crate::classifier::ClassifiedRecord;
use crate::diagnostics::{Diagnostics, WarningKind};
use chrono::{DateTime, Utc};
use rmsa_common::{Phase, StudyDesign};
use serde_json::Value;
use std::collections::BTreeMap;

/// Item values of one `block_<condition>_<phase>` record
#[derive(Debug, Clone, PartialEq)]
pub struct BlockObservation {
    pub participant_id: String,
    pub condition: String,
    pub phase: Phase,
    /// Indexed like `StudyDesign::items`; items of the other phase stay `None`
    pub values: Vec<Option<f64>>,
    pub timestamp: Option<DateTime<Utc>>,
    pub sequence_index: usize,
}

/// Outcome of coercing one raw Likert value
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    Value(f64),
    /// Absent, null or blank
    Missing,
    /// Present but unusable
    Rejected(String),
}

/// Coerce a raw payload value onto the Likert scale
pub fn coerce_likert(raw: Option<&Value>, design: &StudyDesign) -> Coerced {
    let number = match raw {
        None | Some(Value::Null) => return Coerced::Missing,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                return Coerced::Missing;
            }
            t.parse::<f64>().ok()
        }
        Some(_) => None,
    };

    match number {
        Some(v) if !v.is_finite() => Coerced::Rejected("not a finite number".to_string()),
        Some(v) if !design.scale.contains(v) => Coerced::Rejected(format!(
            "outside scale {}..{}",
            design.scale.min, design.scale.max
        )),
        Some(v) => Coerced::Value(v),
        None => Coerced::Rejected("not numeric".to_string()),
    }
}

/// Extract block observations from classified records
pub fn observe(
    classified: &[ClassifiedRecord<'_>],
    design: &StudyDesign,
    diag: &mut Diagnostics,
) -> Vec<BlockObservation> {
    let mut out = Vec::new();

    for entry in classified {
        let Some((condition, phase)) = entry.block() else {
            continue;
        };
        let record = entry.record;
        let mut values = vec![None; design.items.len()];

        for (idx, item) in design.items.iter().enumerate() {
            if item.phase != phase {
                continue;
            }
            let raw = record.payload().get(&item.code);
            match coerce_likert(raw, design) {
                Coerced::Value(v) => values[idx] = Some(v),
                Coerced::Missing => {}
                Coerced::Rejected(reason) => diag.push(
                    WarningKind::Coercion,
                    format!(
                        "{} {} {}={} ({}); treated as missing",
                        record.participant_id(),
                        record.section_key(),
                        item.code,
                        raw.map(|v| v.to_string()).unwrap_or_default(),
                        reason
                    ),
                ),
            }
        }

        out.push(BlockObservation {
            participant_id: record.participant_id().to_string(),
            condition: condition.to_string(),
            phase,
            values,
            timestamp: record.timestamp(),
            sequence_index: record.sequence_index(),
        });
    }

    out
}

/// 1-based order in which each participant attempted each condition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockPositions {
    positions: BTreeMap<(String, String), usize>,
}

impl BlockPositions {
    /// Rank conditions per participant by earliest timestamp
    ///
    /// Conditions without any timestamp rank after timestamped ones; ties are
    /// broken by the earliest ingestion index.
    pub fn compute(observations: &[BlockObservation]) -> Self {
        type Earliest = (Option<DateTime<Utc>>, usize);
        let mut earliest: BTreeMap<&str, BTreeMap<&str, Earliest>> = BTreeMap::new();

        for obs in observations {
            let slot = earliest
                .entry(obs.participant_id.as_str())
                .or_default()
                .entry(obs.condition.as_str())
                .or_insert((None, usize::MAX));
            slot.0 = match (slot.0, obs.timestamp) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            slot.1 = slot.1.min(obs.sequence_index);
        }

        let mut positions = BTreeMap::new();
        for (pid, conditions) in earliest {
            let mut ordered: Vec<(&str, Earliest)> = conditions.into_iter().collect();
            ordered.sort_by_key(|(_, (ts, seq))| (ts.is_none(), *ts, *seq));
            for (rank, (condition, _)) in ordered.into_iter().enumerate() {
                positions.insert((pid.to_string(), condition.to_string()), rank + 1);
            }
        }

        Self { positions }
    }

    pub fn get(&self, participant_id: &str, condition: &str) -> Option<usize> {
        self.positions
            .get(&(participant_id.to_string(), condition.to_string()))
            .copied()
    }

    /// Conditions of one participant in attempted order
    pub fn sequence(&self, participant_id: &str) -> Vec<&str> {
        let mut seq: Vec<(usize, &str)> = self
            .positions
            .iter()
            .filter(|((pid, _), _)| pid == participant_id)
            .map(|((_, condition), pos)| (*pos, condition.as_str()))
            .collect();
        seq.sort();
        seq.into_iter().map(|(_, c)| c).collect()
    }
}
