//! Holm-Bonferroni adjustment

/// Adjust p-values; output is in input order
///
/// The i-th smallest p (0-based) is multiplied by `m - i` and capped at 1.
/// Walking back from the largest, each adjusted value is lowered to its
/// next-larger neighbour's when that is smaller.
pub fn holm(pvals: &[f64]) -> Vec<f64> {
    let m = pvals.len();
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| pvals[a].total_cmp(&pvals[b]));

    let mut adjusted = vec![0.0; m];
    for (i, &idx) in order.iter().enumerate() {
        adjusted[idx] = ((m - i) as f64 * pvals[idx]).min(1.0);
    }
    for i in (0..m.saturating_sub(1)).rev() {
        let (cur, next) = (order[i], order[i + 1]);
        adjusted[cur] = adjusted[cur].min(adjusted[next]);
    }
    adjusted
}
