//! Percentile bootstrap intervals for means
//!
//! Each job resamples independently with its own `StdRng`, seeded from the run
//! seed mixed with a stable hash of the job key, so results do not depend on
//! scheduling. Jobs run on the rayon pool and are merged into a key-ordered map.

use super::descriptive::percentile;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// One sample to bootstrap
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapJob {
    pub key: String,
    pub values: Vec<f64>,
}

impl BootstrapJob {
    pub fn new(key: String, values: Vec<f64>) -> Self {
        Self { key, values }
    }
}

pub fn descriptive_key(item: &str, condition: &str) -> String {
    format!("mean|{}|{}", item, condition)
}

pub fn contrast_key(item: &str, contrast: &str) -> String {
    format!("diff|{}|{}", item, contrast)
}

/// 64-bit FNV-1a
pub fn fnv1a(key: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    key.bytes()
        .fold(OFFSET, |hash, b| (hash ^ b as u64).wrapping_mul(PRIME))
}

/// Percentile interval of resampled means
pub fn mean_ci<R: Rng>(values: &[f64], resamples: usize, confidence: f64, rng: &mut R) -> Option<(f64, f64)> {
    let n = values.len();
    if n == 0 || resamples == 0 {
        return None;
    }

    let mut means: Vec<f64> = (0..resamples)
        .map(|_| {
            let sum: f64 = (0..n).map(|_| values[rng.gen_range(0..n)]).sum();
            sum / n as f64
        })
        .collect();
    means.sort_by(|a, b| a.total_cmp(b));

    let alpha = 1.0 - confidence;
    let lo = percentile(&means, 100.0 * alpha / 2.0)?;
    let hi = percentile(&means, 100.0 * (1.0 - alpha / 2.0))?;
    Some((lo, hi))
}

/// Run all jobs in parallel, keyed by job key
pub fn run_jobs(
    jobs: &[BootstrapJob],
    resamples: usize,
    confidence: f64,
    seed: u64,
) -> BTreeMap<String, Option<(f64, f64)>> {
    jobs.par_iter()
        .map(|job| {
            let mut rng = StdRng::seed_from_u64(seed ^ fnv1a(&job.key));
            (job.key.clone(), mean_ci(&job.values, resamples, confidence, &mut rng))
        })
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}
