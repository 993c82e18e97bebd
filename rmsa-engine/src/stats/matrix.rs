//! Participant x condition matrices

use crate::wide_form::WideRow;
use rmsa_common::StudyDesign;
use std::collections::BTreeMap;

/// A column of the wide table that can be tested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Item(usize),
    Construct(usize),
}

impl Measure {
    pub fn value(self, row: &WideRow) -> Option<f64> {
        match self {
            Measure::Item(idx) => row.values.get(idx).copied().flatten(),
            Measure::Construct(idx) => row.composites.get(idx).copied().flatten(),
        }
    }
}

/// Every item, then every construct, in declared order
pub fn measures(design: &StudyDesign) -> Vec<(String, Measure)> {
    let items = design
        .items
        .iter()
        .enumerate()
        .map(|(idx, item)| (item.code.clone(), Measure::Item(idx)));
    let constructs = design
        .constructs
        .iter()
        .enumerate()
        .map(|(idx, c)| (c.name.clone(), Measure::Construct(idx)));
    items.chain(constructs).collect()
}

/// Values of one measure with participants as rows and conditions as columns
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionMatrix {
    pub participants: Vec<String>,
    /// `cells[participant][condition]`, columns in declared condition order
    pub cells: Vec<Vec<Option<f64>>>,
}

impl ConditionMatrix {
    pub fn build(wide: &[WideRow], measure: Measure, design: &StudyDesign) -> Self {
        let k = design.conditions.len();
        let mut rows: BTreeMap<&str, Vec<Option<f64>>> = BTreeMap::new();

        for row in wide {
            let Some(col) = design.conditions.iter().position(|c| c.code == row.condition) else {
                continue;
            };
            let cells = rows
                .entry(row.participant_id.as_str())
                .or_insert_with(|| vec![None; k]);
            cells[col] = measure.value(row);
        }

        let (participants, cells) = rows
            .into_iter()
            .map(|(pid, cells)| (pid.to_string(), cells))
            .unzip();
        Self { participants, cells }
    }

    /// Non-null values of one condition
    pub fn column(&self, col: usize) -> Vec<f64> {
        self.cells
            .iter()
            .filter_map(|row| row.get(col).copied().flatten())
            .collect()
    }

    /// Whether every condition has at least one value
    pub fn has_all_conditions(&self) -> bool {
        let k = self.cells.first().map(|r| r.len()).unwrap_or(0);
        k > 0 && (0..k).all(|col| self.cells.iter().any(|row| row[col].is_some()))
    }

    /// Rows with a value in every condition
    pub fn complete_cases(&self) -> Vec<Vec<f64>> {
        self.cells
            .iter()
            .filter_map(|row| row.iter().copied().collect::<Option<Vec<f64>>>())
            .collect()
    }

    /// Participants with values in both columns, as `(a, b)`
    pub fn paired(&self, a: usize, b: usize) -> Vec<(f64, f64)> {
        self.cells
            .iter()
            .filter_map(|row| Some((row.get(a).copied().flatten()?, row.get(b).copied().flatten()?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pid: &str, condition: &str, a1: Option<f64>) -> WideRow {
        let design = StudyDesign::builtin();
        let mut values = vec![None; design.items.len()];
        values[0] = a1;
        WideRow {
            participant_id: pid.to_string(),
            condition: condition.to_string(),
            block_position: None,
            values,
            composites: vec![None; design.constructs.len()],
        }
    }

    #[test]
    fn test_complete_cases_drop_partial_participants() {
        let design = StudyDesign::builtin();
        let wide = vec![
            row("P1", "A", Some(1.0)),
            row("P1", "B", Some(2.0)),
            row("P1", "C", Some(3.0)),
            row("P2", "A", Some(4.0)),
            row("P2", "B", Some(5.0)),
        ];
        let m = ConditionMatrix::build(&wide, Measure::Item(0), &design);

        assert_eq!(m.participants, vec!["P1", "P2"]);
        assert_eq!(m.complete_cases(), vec![vec![1.0, 2.0, 3.0]]);
        assert_eq!(m.column(0), vec![1.0, 4.0]);
        assert_eq!(m.paired(1, 0), vec![(2.0, 1.0), (5.0, 4.0)]);
        assert!(m.has_all_conditions());
    }

    #[test]
    fn test_missing_condition_column() {
        let design = StudyDesign::builtin();
        let wide = vec![row("P1", "A", Some(1.0)), row("P1", "B", Some(2.0))];
        let m = ConditionMatrix::build(&wide, Measure::Item(0), &design);
        assert!(!m.has_all_conditions());
    }

    #[test]
    fn test_measures_items_then_constructs() {
        let names: Vec<String> = measures(&StudyDesign::builtin()).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names.len(), 22);
        assert_eq!(names[0], "A_1");
        assert_eq!(names[19], "Intermediality Index");
    }
}
