//! Average ranking with tie bookkeeping

/// 1-based ranks with ties sharing their mean rank
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    pub ranks: Vec<f64>,
    /// Sizes of tie groups larger than one
    pub ties: Vec<usize>,
}

impl Ranking {
    /// `Σ (t³ - t)` over tie groups
    pub fn tie_term(&self) -> f64 {
        self.ties
            .iter()
            .map(|&t| {
                let t = t as f64;
                t * t * t - t
            })
            .sum()
    }
}

pub fn average_ranks(values: &[f64]) -> Ranking {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut ties = Vec::new();
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end hold ranks start+1..=end
        let rank = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        if end - start > 1 {
            ties.push(end - start);
        }
        start = end;
    }

    Ranking { ranks, ties }
}
