//! Wide-Form Builder
//!
//! One row per (participant, condition): the outer join of that pair's `pre`
//! and `post` observations, followed by the composite scores. A missing phase
//! leaves its item columns empty rather than dropping the row.

use crate::blocks::{BlockObservation, BlockPositions};
use crate::composite;
use crate::long_form::LongRow;
use rmsa_common::{Phase, StudyDesign};
use std::collections::BTreeMap;

/// One row of the canonical wide table
#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    pub participant_id: String,
    pub condition: String,
    pub block_position: Option<usize>,
    /// Indexed like `StudyDesign::items`
    pub values: Vec<Option<f64>>,
    /// Indexed like `StudyDesign::constructs`
    pub composites: Vec<Option<f64>>,
}

impl WideRow {
    pub fn value(&self, design: &StudyDesign, item: &str) -> Option<f64> {
        design
            .item_index(item)
            .and_then(|idx| self.values.get(idx).copied().flatten())
    }

    pub fn composite(&self, design: &StudyDesign, construct: &str) -> Option<f64> {
        design
            .constructs
            .iter()
            .position(|c| c.name == construct)
            .and_then(|idx| self.composites.get(idx).copied().flatten())
    }
}

/// Join observations into wide rows sorted by (participant, condition)
pub fn build(
    observations: &[BlockObservation],
    positions: &BlockPositions,
    design: &StudyDesign,
) -> Vec<WideRow> {
    let mut joined: BTreeMap<(&str, &str), Vec<Option<f64>>> = BTreeMap::new();

    for obs in observations {
        let values = joined
            .entry((obs.participant_id.as_str(), obs.condition.as_str()))
            .or_insert_with(|| vec![None; design.items.len()]);
        for (idx, item) in design.items.iter().enumerate() {
            if item.phase == obs.phase {
                values[idx] = obs.values.get(idx).copied().flatten();
            }
        }
    }

    joined
        .into_iter()
        .map(|((pid, condition), values)| {
            let composites = composite::compute_all(&values, design);
            WideRow {
                participant_id: pid.to_string(),
                condition: condition.to_string(),
                block_position: positions.get(pid, condition),
                values,
                composites,
            }
        })
        .collect()
}

/// Pivot block rows of the long table back into wide rows without composites
pub fn pivot_long(long: &[LongRow], design: &StudyDesign) -> Vec<WideRow> {
    let mut joined: BTreeMap<(&str, &str), (Option<usize>, Vec<Option<f64>>)> = BTreeMap::new();

    for row in long.iter().filter(|r| r.phase != Phase::End) {
        let Some(idx) = design.item_index(&row.item) else {
            continue;
        };
        let entry = joined
            .entry((row.participant_id.as_str(), row.condition.as_str()))
            .or_insert_with(|| (row.block_position, vec![None; design.items.len()]));
        entry.1[idx] = row.value;
    }

    joined
        .into_iter()
        .map(|((pid, condition), (block_position, values))| WideRow {
            participant_id: pid.to_string(),
            condition: condition.to_string(),
            block_position,
            values,
            composites: Vec::new(),
        })
        .collect()
}
