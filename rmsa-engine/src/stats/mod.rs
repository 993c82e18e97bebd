//! Hypothesis Testing Engine
//!
//! For every item and construct ("measure"):
//! - descriptive statistics per condition over all available values
//! - Friedman omnibus test on the complete-case participant x condition matrix
//! - pairwise two-sided Wilcoxon signed-rank tests on the same complete cases,
//!   Holm-adjusted within the measure
//! - paired contrasts (later minus earlier condition) with bootstrap intervals
//!
//! Tests that cannot be run produce a row with empty statistics and a note.
//! Bootstrap jobs run in parallel and are merged back in key order.

pub mod bootstrap;
pub mod descriptive;
pub mod friedman;
pub mod holm;
pub mod matrix;
pub mod ranks;
pub mod wilcoxon;

use crate::diagnostics::{Diagnostics, WarningKind};
use crate::wide_form::WideRow;
use bootstrap::BootstrapJob;
use matrix::ConditionMatrix;
use rmsa_common::config::AnalysisSettings;
use rmsa_common::StudyDesign;
use serde::Serialize;
use tracing::info;

/// Reason a test produced no statistic
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Inconclusive {
    #[error("missing conditions in data")]
    MissingConditions,

    #[error("insufficient complete cases (n={n}, need {required})")]
    InsufficientCases { n: usize, required: usize },

    #[error("requires at least 3 conditions (k={0})")]
    TooFewConditions(usize),

    #[error("all values tied within every participant")]
    AllTied,

    #[error("all paired differences are zero")]
    ZeroDifferences,

    #[error("zero variance in signed ranks")]
    ZeroVariance,
}

/// Descriptive statistics of one measure in one condition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptiveRow {
    pub item: String,
    pub condition: String,
    pub n: usize,
    pub mean: Option<f64>,
    pub sd: Option<f64>,
    pub median: Option<f64>,
    pub iqr: Option<f64>,
    pub q1: Option<f64>,
    pub q3: Option<f64>,
    pub ci_low: Option<f64>,
    pub ci_high: Option<f64>,
}

/// Friedman omnibus result for one measure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FriedmanRow {
    pub item: String,
    pub n: usize,
    pub chi2: Option<f64>,
    pub p: Option<f64>,
    pub kendalls_w: Option<f64>,
    pub note: Option<String>,
}

/// Wilcoxon result for one unordered condition pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WilcoxonRow {
    pub item: String,
    pub pair: String,
    pub n: usize,
    pub stat: Option<f64>,
    pub p: Option<f64>,
    pub p_holm: Option<f64>,
    pub note: Option<String>,
}

/// Mean within-participant difference for an ordered condition pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContrastRow {
    pub item: String,
    pub contrast: String,
    pub n: usize,
    pub mean_diff: Option<f64>,
    pub ci_low: Option<f64>,
    pub ci_high: Option<f64>,
}

/// Omnibus plus pairwise results of one measure
#[derive(Debug, Clone, PartialEq)]
pub struct StatResult {
    pub item: String,
    pub friedman: FriedmanRow,
    pub pairs: Vec<WilcoxonRow>,
}

/// All statistics of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsReport {
    pub descriptives: Vec<DescriptiveRow>,
    pub results: Vec<StatResult>,
    pub contrasts: Vec<ContrastRow>,
}

impl StatsReport {
    pub fn friedman_rows(&self) -> impl Iterator<Item = &FriedmanRow> {
        self.results.iter().map(|r| &r.friedman)
    }

    pub fn wilcoxon_rows(&self) -> impl Iterator<Item = &WilcoxonRow> {
        self.results.iter().flat_map(|r| r.pairs.iter())
    }

    pub fn result(&self, item: &str) -> Option<&StatResult> {
        self.results.iter().find(|r| r.item == item)
    }

    pub fn descriptive(&self, item: &str, condition: &str) -> Option<&DescriptiveRow> {
        self.descriptives
            .iter()
            .find(|d| d.item == item && d.condition == condition)
    }
}

/// Ordered contrasts `(later, earlier)`: C-A, C-B, B-A for A, B, C
pub fn contrast_pairs(conditions: &[&str]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for later in (1..conditions.len()).rev() {
        for earlier in 0..later {
            pairs.push((later, earlier));
        }
    }
    pairs
}

/// Unordered pairs in declared order: A-B, A-C, B-C
pub fn unordered_pairs(k: usize) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for a in 0..k {
        for b in (a + 1)..k {
            pairs.push((a, b));
        }
    }
    pairs
}

/// Run every test for every measure over the wide table
pub fn analyze(
    wide: &[WideRow],
    design: &StudyDesign,
    settings: &AnalysisSettings,
    diag: &mut Diagnostics,
) -> StatsReport {
    let conditions = design.condition_codes();
    let measures = matrix::measures(design);

    let mut jobs = Vec::new();
    let mut descriptives = Vec::new();
    let mut contrasts = Vec::new();
    let mut results = Vec::new();

    for (name, measure) in &measures {
        let m = ConditionMatrix::build(wide, *measure, design);

        for (j, condition) in conditions.iter().enumerate() {
            let column = m.column(j);
            let summary = descriptive::summarize(&column);
            descriptives.push(DescriptiveRow {
                item: name.clone(),
                condition: condition.to_string(),
                n: column.len(),
                mean: summary.as_ref().map(|s| s.mean),
                sd: summary.as_ref().map(|s| s.sd),
                median: summary.as_ref().map(|s| s.median),
                iqr: summary.as_ref().map(|s| s.iqr()),
                q1: summary.as_ref().map(|s| s.q1),
                q3: summary.as_ref().map(|s| s.q3),
                ci_low: None,
                ci_high: None,
            });
            jobs.push(BootstrapJob::new(bootstrap::descriptive_key(name, condition), column));
        }

        for (later, earlier) in contrast_pairs(&conditions) {
            let label = format!("{}-{}", conditions[later], conditions[earlier]);
            let diffs: Vec<f64> = m
                .paired(later, earlier)
                .into_iter()
                .map(|(a, b)| a - b)
                .collect();
            contrasts.push(ContrastRow {
                item: name.clone(),
                contrast: label.clone(),
                n: diffs.len(),
                mean_diff: descriptive::mean(&diffs),
                ci_low: None,
                ci_high: None,
            });
            jobs.push(BootstrapJob::new(bootstrap::contrast_key(name, &label), diffs));
        }

        results.push(test_measure(name, &m, &conditions, settings, diag));
    }

    let intervals = bootstrap::run_jobs(
        &jobs,
        settings.bootstrap_resamples,
        settings.confidence_level,
        settings.seed,
    );
    for row in &mut descriptives {
        if let Some(Some((lo, hi))) = intervals.get(&bootstrap::descriptive_key(&row.item, &row.condition)) {
            row.ci_low = Some(*lo);
            row.ci_high = Some(*hi);
        }
    }
    for row in &mut contrasts {
        if let Some(Some((lo, hi))) = intervals.get(&bootstrap::contrast_key(&row.item, &row.contrast)) {
            row.ci_low = Some(*lo);
            row.ci_high = Some(*hi);
        }
    }

    info!(
        measures = measures.len(),
        bootstrap_jobs = jobs.len(),
        "Statistics computed"
    );

    StatsReport {
        descriptives,
        results,
        contrasts,
    }
}

/// Friedman plus Holm-adjusted pairwise Wilcoxon for one measure
fn test_measure(
    name: &str,
    m: &ConditionMatrix,
    conditions: &[&str],
    settings: &AnalysisSettings,
    diag: &mut Diagnostics,
) -> StatResult {
    let complete = m.complete_cases();
    let n = complete.len();
    let pairs = unordered_pairs(conditions.len());

    let gate = if !m.has_all_conditions() {
        Err(Inconclusive::MissingConditions)
    } else if n < settings.min_complete_cases {
        Err(Inconclusive::InsufficientCases {
            n,
            required: settings.min_complete_cases,
        })
    } else {
        Ok(())
    };

    if let Err(reason) = gate {
        diag.push(
            WarningKind::DesignIncomplete,
            format!("{}: tests skipped, {}", name, reason),
        );
        let note = Some(reason.to_string());
        return StatResult {
            item: name.to_string(),
            friedman: FriedmanRow {
                item: name.to_string(),
                n,
                chi2: None,
                p: None,
                kendalls_w: None,
                note: note.clone(),
            },
            pairs: pairs
                .iter()
                .map(|&(a, b)| WilcoxonRow {
                    item: name.to_string(),
                    pair: format!("{}-{}", conditions[a], conditions[b]),
                    n,
                    stat: None,
                    p: None,
                    p_holm: None,
                    note: note.clone(),
                })
                .collect(),
        };
    }

    let friedman = match friedman::friedman(&complete) {
        Ok(out) => FriedmanRow {
            item: name.to_string(),
            n,
            chi2: Some(out.chi2),
            p: Some(out.p),
            kendalls_w: Some(out.kendalls_w),
            note: None,
        },
        Err(reason) => FriedmanRow {
            item: name.to_string(),
            n,
            chi2: None,
            p: None,
            kendalls_w: None,
            note: Some(reason.to_string()),
        },
    };

    let mut rows: Vec<WilcoxonRow> = pairs
        .iter()
        .map(|&(a, b)| {
            let diffs: Vec<f64> = complete.iter().map(|row| row[a] - row[b]).collect();
            let pair = format!("{}-{}", conditions[a], conditions[b]);
            let outcome = if diffs.len() < settings.min_complete_cases {
                Err(Inconclusive::InsufficientCases {
                    n: diffs.len(),
                    required: settings.min_complete_cases,
                })
            } else {
                wilcoxon::signed_rank(&diffs)
            };
            match outcome {
                Ok(out) => WilcoxonRow {
                    item: name.to_string(),
                    pair,
                    n: diffs.len(),
                    stat: Some(out.stat),
                    p: Some(out.p),
                    p_holm: None,
                    note: None,
                },
                Err(reason) => WilcoxonRow {
                    item: name.to_string(),
                    pair,
                    n: diffs.len(),
                    stat: None,
                    p: None,
                    p_holm: None,
                    note: Some(reason.to_string()),
                },
            }
        })
        .collect();

    let valid: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.p.map(|_| i))
        .collect();
    let raw: Vec<f64> = valid.iter().filter_map(|&i| rows[i].p).collect();
    for (&i, adjusted) in valid.iter().zip(holm::holm(&raw)) {
        rows[i].p_holm = Some(adjusted);
    }

    StatResult {
        item: name.to_string(),
        friedman,
        pairs: rows,
    }
}
