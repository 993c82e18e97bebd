//! Cross-stage properties of the reconciliation and statistics pipeline
//!
//! Covers:
//! - Resolution is idempotent and independent of input order
//! - Timestamp ties fall back to ingestion order
//! - Composites reverse-code before averaging
//! - Tests exclude participants lacking any condition; descriptives do not
//! - Long -> wide pivot reproduces the wide table and its composites

use rmsa_common::config::AnalysisSettings;
use rmsa_common::StudyDesign;
use rmsa_engine::model::RawSubmission;
use rmsa_engine::stats::holm::holm;
use rmsa_engine::{composite, resolver, wide_form, Pipeline, WarningKind};
use serde_json::{json, Value};

fn pipeline() -> Pipeline {
    let settings = AnalysisSettings {
        bootstrap_resamples: 200,
        ..Default::default()
    };
    Pipeline::new(StudyDesign::builtin(), settings)
}

fn submission(pid: &str, section: &str, value: i64, ts: Option<&str>, seq: usize) -> RawSubmission {
    RawSubmission {
        participant_id: pid.to_string(),
        section_key: section.to_string(),
        payload: [("A_1".to_string(), json!(value))].into_iter().collect(),
        timestamp: ts.and_then(rmsa_common::time::parse_timestamp_str),
        sequence_index: seq,
    }
}

fn record(pid: &str, section: &str, ts: &str, payload: Value) -> Value {
    json!({
        "participant_id": pid,
        "section_key": section,
        "updated_at": ts,
        "payload": payload,
    })
}

#[test]
fn test_resolution_is_idempotent() {
    let subs = vec![
        submission("P1", "block_A_pre", 3, Some("2025-01-01T10:00:00Z"), 0),
        submission("P1", "block_A_pre", 5, Some("2025-01-01T11:00:00Z"), 1),
        submission("P2", "block_A_pre", 4, None, 2),
        submission("P2", "block_A_pre", 6, None, 3),
    ];
    let once = resolver::resolve(subs);
    let twice = resolver::resolve_records(once.clone());

    assert_eq!(once.len(), 2);
    assert_eq!(twice, once);
}

#[test]
fn test_latest_timestamp_wins_in_either_order() {
    let early = submission("P1", "block_A_pre", 3, Some("2025-01-01T10:00:00Z"), 0);
    let late = submission("P1", "block_A_pre", 5, Some("2025-01-01T11:00:00Z"), 1);

    let forward = resolver::resolve(vec![early.clone(), late.clone()]);
    let mut early_last = early;
    early_last.sequence_index = 1;
    let mut late_first = late;
    late_first.sequence_index = 0;
    let backward = resolver::resolve(vec![late_first, early_last]);

    assert_eq!(forward[0].payload()["A_1"], json!(5));
    assert_eq!(backward[0].payload()["A_1"], json!(5));
    assert_eq!(forward[0].candidates, 2);
}

#[test]
fn test_timestamp_tie_uses_ingestion_order() {
    let ts = Some("2025-01-01T10:00:00Z");
    let first = resolver::resolve(vec![
        submission("P1", "block_A_pre", 3, ts, 0),
        submission("P1", "block_A_pre", 5, ts, 1),
    ]);
    let flipped = resolver::resolve(vec![
        submission("P1", "block_A_pre", 5, ts, 0),
        submission("P1", "block_A_pre", 3, ts, 1),
    ]);

    assert_eq!(first[0].payload()["A_1"], json!(5));
    assert_eq!(flipped[0].payload()["A_1"], json!(3));
}

#[test]
fn test_reverse_coded_composite() {
    let design = StudyDesign::builtin();
    let agency = design.constructs.iter().find(|c| c.name == "Agency Index").unwrap();
    let mut values = vec![None; design.items.len()];
    for (code, v) in [("A_2", 7.0), ("A_3", 7.0), ("A_4", 7.0), ("A_6", 1.0)] {
        values[design.item_index(code).unwrap()] = Some(v);
    }
    assert_eq!(composite::compute(agency, &values, &design), Some(7.0));
}

#[test]
fn test_holm_adjustment() {
    let adjusted = holm(&[0.01, 0.02, 0.04]);
    let expected = [0.03, 0.04, 0.04];
    for (a, e) in adjusted.iter().zip(expected) {
        assert!((a - e).abs() < 1e-12, "{} != {}", a, e);
    }
}

#[test]
fn test_end_to_end_descriptive_mean_and_friedman() {
    let mut records = Vec::new();
    for (p, pid) in ["P1", "P2", "P3"].iter().enumerate() {
        for (c, condition) in ["A", "B", "C"].iter().enumerate() {
            let value = if *pid == "P1" && *condition == "A" { 7 } else { 4 };
            records.push(record(
                pid,
                &format!("block_{}_pre", condition),
                &format!("2025-02-0{}T0{}:00:00Z", p + 1, c),
                json!({"A_1": value}),
            ));
        }
    }

    let output = pipeline().run_value(&Value::Array(records));
    let stats = &output.stats;

    let desc = stats.descriptive("A_1", "A").unwrap();
    assert_eq!(desc.n, 3);
    assert!((desc.mean.unwrap() - 5.0).abs() < 1e-12);
    assert_eq!(stats.descriptive("A_1", "B").unwrap().mean, Some(4.0));

    let friedman = &stats.result("A_1").unwrap().friedman;
    assert_eq!(friedman.n, 3);
    let chi2 = friedman.chi2.unwrap();
    let p = friedman.p.unwrap();
    assert!(chi2.is_finite() && chi2 > 0.0);
    assert!(p.is_finite() && (0.0..=1.0).contains(&p));
    assert!(friedman.note.is_none());
}

#[test]
fn test_incomplete_participant_excluded_from_tests_only() {
    let values = [[5, 3, 6], [4, 2, 7], [6, 3, 5]];
    let mut records = Vec::new();
    for (p, row) in values.iter().enumerate() {
        let pid = format!("P{}", p + 1);
        for (c, condition) in ["A", "B", "C"].iter().enumerate() {
            records.push(record(
                &pid,
                &format!("block_{}_pre", condition),
                &format!("2025-02-0{}T0{}:00:00Z", p + 1, c),
                json!({"A_1": row[c]}),
            ));
        }
    }
    records.push(record("P4", "block_A_pre", "2025-02-05T00:00:00Z", json!({"A_1": 1})));
    records.push(record("P4", "block_B_pre", "2025-02-05T01:00:00Z", json!({"A_1": 1})));

    let output = pipeline().run_value(&Value::Array(records));
    let stats = &output.stats;

    assert_eq!(stats.descriptive("A_1", "A").unwrap().n, 4);
    assert_eq!(stats.descriptive("A_1", "B").unwrap().n, 4);
    assert_eq!(stats.descriptive("A_1", "C").unwrap().n, 3);
    assert_eq!(stats.descriptive("A_1", "A").unwrap().mean, Some(4.0));

    let result = stats.result("A_1").unwrap();
    assert_eq!(result.friedman.n, 3);
    assert!(result.pairs.iter().all(|w| w.n == 3));
    assert_eq!(output.diagnostics.count(WarningKind::BlockCount), 1);
}

#[test]
fn test_long_pivot_reproduces_wide_table() {
    let design = StudyDesign::builtin();
    let mut records = Vec::new();
    for (p, pid) in ["P1", "P2"].iter().enumerate() {
        for (c, condition) in ["A", "B", "C"].iter().enumerate() {
            let ts = format!("2025-02-0{}T0{}:00:00Z", p + 1, c);
            records.push(record(
                pid,
                &format!("block_{}_pre", condition),
                &ts,
                json!({"A_2": 1 + c, "A_3": 2 + p, "A_6": 7 - c}),
            ));
            if !(*pid == "P2" && *condition == "C") {
                records.push(record(
                    pid,
                    &format!("block_{}_post", condition),
                    &ts,
                    json!({"B_1": 3, "B_5": 2 + c, "B_7": 4, "B_8": "5"}),
                ));
            }
        }
    }

    let output = pipeline().run_value(&Value::Array(records));
    let pivoted = wide_form::pivot_long(&output.long, &design);

    assert_eq!(pivoted.len(), output.wide.len());
    for (back, orig) in pivoted.iter().zip(&output.wide) {
        assert_eq!(back.participant_id, orig.participant_id);
        assert_eq!(back.condition, orig.condition);
        assert_eq!(back.block_position, orig.block_position);
        assert_eq!(back.values, orig.values);
        assert_eq!(composite::compute_all(&back.values, &design), orig.composites);
    }
}

#[test]
fn test_empty_export_marks_every_measure_incomplete() {
    let output = pipeline().run_value(&json!([]));
    assert!(output.canonical.is_empty());
    assert!(output.long.is_empty());
    assert_eq!(output.diagnostics.count(WarningKind::DesignIncomplete), 22);
    assert!(output
        .stats
        .friedman_rows()
        .all(|f| f.note.as_deref() == Some("missing conditions in data")));
}

/// Pre-block submissions carrying `A_1`; `None` leaves the block out
fn a1_matrix(rows: &[[Option<i64>; 3]]) -> Value {
    let mut records = Vec::new();
    for (p, row) in rows.iter().enumerate() {
        let pid = format!("P{}", p + 1);
        for (c, condition) in ["A", "B", "C"].iter().enumerate() {
            if let Some(value) = row[c] {
                records.push(record(
                    &pid,
                    &format!("block_{}_pre", condition),
                    &format!("2025-02-{:02}T0{}:00:00Z", p + 1, c),
                    json!({"A_1": value}),
                ));
            }
        }
    }
    Value::Array(records)
}

#[test]
fn test_too_few_complete_cases_yields_null_results() {
    let input = a1_matrix(&[
        [Some(5), Some(3), Some(6)],
        [Some(4), Some(2), Some(7)],
        [Some(6), Some(3), None],
    ]);
    let output = pipeline().run_value(&input);
    let result = output.stats.result("A_1").unwrap();

    let note = Some("insufficient complete cases (n=2, need 3)".to_string());
    assert_eq!(result.friedman.n, 2);
    assert_eq!(result.friedman.chi2, None);
    assert_eq!(result.friedman.p, None);
    assert_eq!(result.friedman.kendalls_w, None);
    assert_eq!(result.friedman.note, note);
    assert_eq!(result.pairs.len(), 3);
    for pair in &result.pairs {
        assert_eq!(pair.stat, None);
        assert_eq!(pair.p, None);
        assert_eq!(pair.p_holm, None);
        assert_eq!(pair.note, note);
    }
    assert!(output
        .diagnostics
        .of_kind(WarningKind::DesignIncomplete)
        .any(|w| w.message.starts_with("A_1:")));

    // Descriptives still use every available value
    assert_eq!(output.stats.descriptive("A_1", "A").unwrap().n, 3);
}

#[test]
fn test_tied_rows_produce_notes_not_statistics() {
    let input = a1_matrix(&[
        [Some(4), Some(4), Some(4)],
        [Some(5), Some(5), Some(5)],
        [Some(3), Some(3), Some(3)],
    ]);
    let output = pipeline().run_value(&input);
    let result = output.stats.result("A_1").unwrap();

    assert_eq!(result.friedman.n, 3);
    assert_eq!(result.friedman.chi2, None);
    assert_eq!(
        result.friedman.note.as_deref(),
        Some("all values tied within every participant")
    );
    for pair in &result.pairs {
        assert_eq!(pair.p, None);
        assert_eq!(pair.p_holm, None);
        assert_eq!(pair.note.as_deref(), Some("all paired differences are zero"));
    }
}

#[test]
fn test_holm_applies_only_to_valid_pairs() {
    let input = a1_matrix(&[
        [Some(3), Some(3), Some(5)],
        [Some(4), Some(4), Some(6)],
        [Some(2), Some(2), Some(5)],
        [Some(5), Some(5), Some(7)],
    ]);
    let output = pipeline().run_value(&input);
    let result = output.stats.result("A_1").unwrap();

    assert!(result.friedman.chi2.is_some());
    assert!(result.friedman.note.is_none());

    let pair = |label: &str| result.pairs.iter().find(|w| w.pair == label).unwrap();
    let ab = pair("A-B");
    assert_eq!(ab.p, None);
    assert_eq!(ab.p_holm, None);
    assert_eq!(ab.note.as_deref(), Some("all paired differences are zero"));

    for label in ["A-C", "B-C"] {
        let w = pair(label);
        let (p, adjusted) = (w.p.unwrap(), w.p_holm.unwrap());
        assert_eq!(w.n, 4);
        assert!(w.note.is_none());
        assert!(adjusted >= p && adjusted <= 1.0);
    }
}
