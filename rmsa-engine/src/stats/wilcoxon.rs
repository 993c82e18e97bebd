//! Wilcoxon signed-rank test (two-sided)
//!
//! Zero differences are dropped before ranking and no continuity correction is
//! applied. With at most `EXACT_LIMIT` non-zero differences and no tied
//! magnitudes the p-value comes from the exact null distribution; otherwise
//! from the normal approximation with tie-corrected variance.

use super::ranks::average_ranks;
use super::Inconclusive;
use statrs::distribution::{ContinuousCDF, Normal};

pub const EXACT_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct WilcoxonOutcome {
    /// Non-zero differences ranked
    pub n: usize,
    /// `min(W+, W-)`
    pub stat: f64,
    pub p: f64,
    pub exact: bool,
}

/// Test paired differences `a - b`
pub fn signed_rank(diffs: &[f64]) -> Result<WilcoxonOutcome, Inconclusive> {
    let nonzero: Vec<f64> = diffs.iter().copied().filter(|d| *d != 0.0).collect();
    let n = nonzero.len();
    if n == 0 {
        return Err(Inconclusive::ZeroDifferences);
    }

    let magnitudes: Vec<f64> = nonzero.iter().map(|d| d.abs()).collect();
    let ranking = average_ranks(&magnitudes);

    let (mut w_plus, mut w_minus) = (0.0, 0.0);
    for (d, r) in nonzero.iter().zip(&ranking.ranks) {
        if *d > 0.0 {
            w_plus += r;
        } else {
            w_minus += r;
        }
    }
    let stat = f64::min(w_plus, w_minus);

    if n <= EXACT_LIMIT && ranking.ties.is_empty() {
        return Ok(WilcoxonOutcome {
            n,
            stat,
            p: exact_p(n, stat),
            exact: true,
        });
    }

    let nf = n as f64;
    let mean = nf * (nf + 1.0) / 4.0;
    let var = nf * (nf + 1.0) * (2.0 * nf + 1.0) / 24.0 - ranking.tie_term() / 48.0;
    if var <= 0.0 {
        return Err(Inconclusive::ZeroVariance);
    }
    let z = (stat - mean) / var.sqrt();
    let normal = Normal::new(0.0, 1.0).map_err(|_| Inconclusive::ZeroVariance)?;
    let p = (2.0 * normal.cdf(-z.abs())).clamp(0.0, 1.0);

    Ok(WilcoxonOutcome {
        n,
        stat,
        p,
        exact: false,
    })
}

/// Two-sided exact p for integer ranks 1..=n: `2 P(T <= stat)`, capped at 1
fn exact_p(n: usize, stat: f64) -> f64 {
    let max_sum = n * (n + 1) / 2;
    // counts[s] = number of rank subsets summing to s
    let mut counts = vec![0.0_f64; max_sum + 1];
    counts[0] = 1.0;
    for rank in 1..=n {
        for s in (rank..=max_sum).rev() {
            counts[s] += counts[s - rank];
        }
    }

    let limit = (stat.floor().max(0.0) as usize).min(max_sum);
    let tail: f64 = counts[..=limit].iter().sum();
    let total = 2.0_f64.powi(n as i32);
    (2.0 * tail / total).min(1.0)
}
