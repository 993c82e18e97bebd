//! CSV table output
//!
//! Fixed-shape tables are serialized straight from their row structs; the
//! wide and participants tables have design- or data-driven columns and are
//! written record by record. Every table gets a header row even when empty.

use crate::error::EngineResult;
use crate::pipeline::PipelineOutput;
use rmsa_common::StudyDesign;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const LONG_FILE: &str = "long_form.csv";
pub const WIDE_FILE: &str = "wide_form.csv";
pub const DESCRIPTIVES_FILE: &str = "descriptives.csv";
pub const FRIEDMAN_FILE: &str = "friedman.csv";
pub const WILCOXON_FILE: &str = "wilcoxon.csv";
pub const CONTRASTS_FILE: &str = "contrasts.csv";
pub const MISSINGNESS_FILE: &str = "missingness.csv";
pub const PARTICIPANTS_FILE: &str = "participants.csv";
pub const PARAM_COUNTS_FILE: &str = "param_counts.csv";
pub const END_OUTCOMES_FILE: &str = "end_outcomes.csv";
pub const CONSTRUCTS_FILE: &str = "constructs.csv";
pub const QUALITATIVE_FILE: &str = "qualitative_notes.csv";

const LONG_COLUMNS: &[&str] = &[
    "participant_id", "condition", "phase", "item", "value", "construct", "block_position",
];
const DESCRIPTIVE_COLUMNS: &[&str] = &[
    "item", "condition", "n", "mean", "sd", "median", "iqr", "q1", "q3", "ci_low", "ci_high",
];
const FRIEDMAN_COLUMNS: &[&str] = &["item", "n", "chi2", "p", "kendalls_w", "note"];
const WILCOXON_COLUMNS: &[&str] = &["item", "pair", "n", "stat", "p", "p_holm", "note"];
const CONTRAST_COLUMNS: &[&str] = &["item", "contrast", "n", "mean_diff", "ci_low", "ci_high"];
const MISSINGNESS_COLUMNS: &[&str] = &[
    "participant_id", "condition", "phase", "item", "n_missing", "n_total",
];
const PARAM_COUNT_COLUMNS: &[&str] = &["condition", "parameter", "count", "percent", "known"];
const END_OUTCOME_COLUMNS: &[&str] = &["outcome", "condition", "count", "known"];
const CONSTRUCT_COLUMNS: &[&str] = &["construct", "items", "reversed", "formula", "interpretation"];
const QUALITATIVE_COLUMNS: &[&str] = &["participant_id", "condition", "phase", "field", "text"];

/// Writes tables into one output directory
pub struct TableWriter {
    outdir: PathBuf,
    written: Vec<PathBuf>,
}

impl TableWriter {
    /// Create the output directory if needed
    pub fn create(outdir: &Path) -> EngineResult<Self> {
        std::fs::create_dir_all(outdir)?;
        Ok(Self {
            outdir: outdir.to_path_buf(),
            written: Vec::new(),
        })
    }

    pub fn outdir(&self) -> &Path {
        &self.outdir
    }

    /// Files written so far, in write order
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    /// Serialize row structs under a fixed header
    ///
    /// `columns` must list the struct's fields in declaration order.
    pub fn write_rows<'r, T, I>(&mut self, name: &str, columns: &[&str], rows: I) -> EngineResult<PathBuf>
    where
        T: Serialize + 'r,
        I: IntoIterator<Item = &'r T>,
    {
        let path = self.outdir.join(name);
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_path(&path)?;
        wtr.write_record(columns)?;
        let mut count = 0usize;
        for row in rows {
            wtr.serialize(row)?;
            count += 1;
        }
        wtr.flush()?;
        debug!(file = %path.display(), rows = count, "Table written");
        self.written.push(path.clone());
        Ok(path)
    }

    /// Write pre-formatted records under a dynamic header
    pub fn write_records<I>(&mut self, name: &str, columns: &[String], rows: I) -> EngineResult<PathBuf>
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let path = self.outdir.join(name);
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_path(&path)?;
        wtr.write_record(columns)?;
        let mut count = 0usize;
        for row in rows {
            wtr.write_record(&row)?;
            count += 1;
        }
        wtr.flush()?;
        debug!(file = %path.display(), rows = count, "Table written");
        self.written.push(path.clone());
        Ok(path)
    }
}

/// Shortest round-trip text of an optional float; empty when null
pub fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{:?}", v)).unwrap_or_default()
}

/// Write every output table
pub fn write_tables(writer: &mut TableWriter, output: &PipelineOutput, design: &StudyDesign) -> EngineResult<()> {
    writer.write_rows(LONG_FILE, LONG_COLUMNS, &output.long)?;

    let mut wide_columns: Vec<String> = ["participant_id", "condition", "block_position"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    wide_columns.extend(design.items.iter().map(|i| i.code.clone()));
    wide_columns.extend(design.constructs.iter().map(|c| c.name.clone()));
    let wide_rows = output.wide.iter().map(|row| {
        let mut record = vec![
            row.participant_id.clone(),
            row.condition.clone(),
            row.block_position.map(|p| p.to_string()).unwrap_or_default(),
        ];
        record.extend(row.values.iter().map(|v| fmt_opt(*v)));
        record.extend(row.composites.iter().map(|v| fmt_opt(*v)));
        record
    });
    writer.write_records(WIDE_FILE, &wide_columns, wide_rows)?;

    writer.write_rows(DESCRIPTIVES_FILE, DESCRIPTIVE_COLUMNS, &output.stats.descriptives)?;
    writer.write_rows(FRIEDMAN_FILE, FRIEDMAN_COLUMNS, output.stats.friedman_rows())?;
    writer.write_rows(WILCOXON_FILE, WILCOXON_COLUMNS, output.stats.wilcoxon_rows())?;
    writer.write_rows(CONTRASTS_FILE, CONTRAST_COLUMNS, &output.stats.contrasts)?;
    writer.write_rows(MISSINGNESS_FILE, MISSINGNESS_COLUMNS, &output.audit.missingness)?;
    writer.write_rows(PARAM_COUNTS_FILE, PARAM_COUNT_COLUMNS, &output.audit.param_counts)?;

    let participant_rows = output
        .participants
        .rows
        .iter()
        .map(|row| row.iter().map(|cell| cell.clone().unwrap_or_default()).collect());
    writer.write_records(PARTICIPANTS_FILE, &output.participants.columns, participant_rows)?;

    writer.write_rows(END_OUTCOMES_FILE, END_OUTCOME_COLUMNS, &output.end_outcomes)?;
    writer.write_rows(CONSTRUCTS_FILE, CONSTRUCT_COLUMNS, &output.constructs)?;
    writer.write_rows(QUALITATIVE_FILE, QUALITATIVE_COLUMNS, &output.qualitative_notes)?;
    Ok(())
}
