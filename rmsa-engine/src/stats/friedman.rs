//! Friedman omnibus test for k >= 3 matched conditions

use super::ranks::average_ranks;
use super::Inconclusive;
use statrs::distribution::{ChiSquared, ContinuousCDF};

#[derive(Debug, Clone, PartialEq)]
pub struct FriedmanOutcome {
    pub n: usize,
    pub k: usize,
    pub chi2: f64,
    pub p: f64,
    /// `chi2 / (n (k - 1))`
    pub kendalls_w: f64,
}

/// Run the test on complete rows (`rows[participant][condition]`)
///
/// Ranks are taken within each row with ties averaged; the statistic is
/// divided by the usual tie correction.
pub fn friedman(rows: &[Vec<f64>]) -> Result<FriedmanOutcome, Inconclusive> {
    let n = rows.len();
    let k = rows.first().map(|r| r.len()).unwrap_or(0);
    if k < 3 {
        return Err(Inconclusive::TooFewConditions(k));
    }
    if n == 0 {
        return Err(Inconclusive::InsufficientCases { n, required: 1 });
    }

    let mut rank_sums = vec![0.0; k];
    let mut tie_term = 0.0;
    for row in rows {
        let ranking = average_ranks(row);
        for (sum, r) in rank_sums.iter_mut().zip(&ranking.ranks) {
            *sum += r;
        }
        tie_term += ranking.tie_term();
    }

    let (nf, kf) = (n as f64, k as f64);
    let ssbn: f64 = rank_sums.iter().map(|r| r * r).sum();
    let raw = 12.0 / (nf * kf * (kf + 1.0)) * ssbn - 3.0 * nf * (kf + 1.0);
    let correction = 1.0 - tie_term / (nf * kf * (kf * kf - 1.0));
    if correction <= f64::EPSILON {
        return Err(Inconclusive::AllTied);
    }
    let chi2 = raw / correction;

    let dist = ChiSquared::new(kf - 1.0).map_err(|_| Inconclusive::TooFewConditions(k))?;
    let p = (1.0 - dist.cdf(chi2)).clamp(0.0, 1.0);

    Ok(FriedmanOutcome {
        n,
        k,
        chi2,
        p,
        kendalls_w: chi2 / (nf * (kf - 1.0)),
    })
}
