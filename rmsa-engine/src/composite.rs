//! Composite index engine
//!
//! A construct's score is the mean of whichever constituent items are present,
//! after mirroring the items in its reversal subset across the scale. The score
//! is `None` only when no constituent item is present.

use rmsa_common::{Construct, StudyDesign};

/// Score one construct from item values indexed like `StudyDesign::items`
pub fn compute(construct: &Construct, values: &[Option<f64>], design: &StudyDesign) -> Option<f64> {
    let mut sum = 0.0;
    let mut n = 0usize;

    for code in &construct.items {
        let Some(idx) = design.item_index(code) else {
            continue;
        };
        let Some(v) = values.get(idx).copied().flatten() else {
            continue;
        };
        sum += if construct.reverse.contains(code) {
            design.scale.reverse(v)
        } else {
            v
        };
        n += 1;
    }

    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// Score every declared construct, in declared order
pub fn compute_all(values: &[Option<f64>], design: &StudyDesign) -> Vec<Option<f64>> {
    design
        .constructs
        .iter()
        .map(|c| compute(c, values, design))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values_for(design: &StudyDesign, pairs: &[(&str, f64)]) -> Vec<Option<f64>> {
        let mut values = vec![None; design.items.len()];
        for (code, v) in pairs {
            values[design.item_index(code).unwrap()] = Some(*v);
        }
        values
    }

    #[test]
    fn test_reverse_coded_mean() {
        let design = StudyDesign::builtin();
        let values = values_for(
            &design,
            &[("B_1", 7.0), ("B_2", 7.0), ("B_3", 7.0), ("B_4", 7.0), ("B_5", 1.0), ("B_6", 1.0)],
        );
        assert_eq!(compute(&design.constructs[0], &values, &design), Some(7.0));
    }

    #[test]
    fn test_partial_items_average_what_is_present() {
        let design = StudyDesign::builtin();
        // Agency: A_2, A_3, A_4, reversed A_6
        let values = values_for(&design, &[("A_2", 6.0), ("A_6", 2.0)]);
        assert_eq!(compute(&design.constructs[1], &values, &design), Some(6.0));
    }

    #[test]
    fn test_no_items_is_none() {
        let design = StudyDesign::builtin();
        let values = values_for(&design, &[("A_1", 4.0)]);
        let scores = compute_all(&values, &design);
        assert_eq!(scores, vec![None, None, None]);
    }

    #[test]
    fn test_reversal_uses_scale_bounds() {
        let mut design = StudyDesign::builtin();
        design.scale = rmsa_common::Scale { min: 1, max: 5 };
        let values = values_for(&design, &[("B_5", 2.0)]);
        assert_eq!(compute(&design.constructs[0], &values, &design), Some(4.0));
    }
}
