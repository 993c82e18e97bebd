//! Run report: `log.txt`, `summary.json` and console summary
//!
//! The log is the artifact a reader inspects before treating the tables as
//! publication-ready: it records what was read (path and SHA-256), how many
//! records survived each stage, and every accumulated warning.

use crate::pipeline::PipelineOutput;
use rmsa_common::config::AnalysisSettings;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

pub const LOG_FILE: &str = "log.txt";
pub const SUMMARY_FILE: &str = "summary.json";

/// Complete run report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run: RunInfo,
    pub counts: RunCounts,
    /// Warning counts keyed by kind
    pub warning_counts: BTreeMap<String, usize>,
    /// Every warning as `[kind] message`, in the order raised
    pub warnings: Vec<String>,
}

/// Run metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    /// Run start (RFC 3339)
    pub timestamp: String,
    pub version: String,
    pub input: String,
    pub input_sha256: Option<String>,
    pub seed: u64,
    pub bootstrap_resamples: usize,
    pub confidence_level: f64,
}

/// Record counts per stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunCounts {
    pub submissions: usize,
    pub canonical_records: usize,
    pub duplicates_collapsed: usize,
    pub participants: usize,
    pub expected_blocks: usize,
    pub observed_blocks: usize,
    pub long_rows: usize,
    pub wide_rows: usize,
    pub missing_responses: usize,
    pub total_responses: usize,
}

impl RunReport {
    pub fn new(
        input: &Path,
        input_sha256: Option<String>,
        settings: &AnalysisSettings,
        output: &PipelineOutput,
    ) -> Self {
        let counts = RunCounts {
            submissions: output.submissions,
            canonical_records: output.canonical.len(),
            duplicates_collapsed: output.submissions.saturating_sub(output.canonical.len()),
            participants: output.audit.participants,
            expected_blocks: output.audit.expected_blocks,
            observed_blocks: output.audit.observed_blocks,
            long_rows: output.long.len(),
            wide_rows: output.wide.len(),
            missing_responses: output.audit.missing_responses,
            total_responses: output.audit.total_responses,
        };

        Self {
            run: RunInfo {
                timestamp: rmsa_common::time::now().to_rfc3339(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                input: input.display().to_string(),
                input_sha256,
                seed: settings.seed,
                bootstrap_resamples: settings.bootstrap_resamples,
                confidence_level: settings.confidence_level,
            },
            counts,
            warning_counts: output
                .diagnostics
                .counts()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            warnings: output.diagnostics.warnings().iter().map(|w| w.to_string()).collect(),
        }
    }

    /// Export report to JSON file
    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Import report from JSON file
    pub fn import_json<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let report: RunReport = serde_json::from_reader(file)?;
        Ok(report)
    }

    /// Plain-text run log
    pub fn render_log(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Run: {}\n", self.run.timestamp));
        out.push_str(&format!("Version: {}\n", self.run.version));
        out.push_str(&format!("Input: {}\n", self.run.input));
        out.push_str(&format!(
            "Input SHA-256: {}\n",
            self.run.input_sha256.as_deref().unwrap_or("unavailable")
        ));
        out.push_str(&format!(
            "Seed: {}  Bootstrap resamples: {}  Confidence: {}\n\n",
            self.run.seed, self.run.bootstrap_resamples, self.run.confidence_level
        ));

        let c = &self.counts;
        out.push_str(&format!("Submissions loaded: {}\n", c.submissions));
        out.push_str(&format!(
            "Canonical records: {} ({} duplicates collapsed)\n",
            c.canonical_records, c.duplicates_collapsed
        ));
        out.push_str(&format!("Participants: {}\n", c.participants));
        out.push_str(&format!(
            "Blocks: {} observed / {} expected\n",
            c.observed_blocks, c.expected_blocks
        ));
        out.push_str(&format!("Long rows: {}  Wide rows: {}\n", c.long_rows, c.wide_rows));
        out.push_str(&format!(
            "Missing Likert responses: {} of {}\n\n",
            c.missing_responses, c.total_responses
        ));

        if self.warnings.is_empty() {
            out.push_str("Warnings: none\n");
        } else {
            out.push_str(&format!("Warnings ({}):\n", self.warnings.len()));
            for w in &self.warnings {
                out.push_str(&format!("WARNING: {}\n", w));
            }
        }
        out
    }

    pub fn write_log<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(self.render_log().as_bytes())?;
        Ok(())
    }
}

/// Hex SHA-256 of a file
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

/// Console formatter for run results
pub struct CliFormatter;

impl CliFormatter {
    /// Format the end-of-run summary
    pub fn format_summary(report: &RunReport, outdir: &Path) -> String {
        let mut output = String::new();
        let c = &report.counts;

        output.push_str("\nAnalysis complete\n");
        output.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
        output.push_str(&format!(
            "Submissions: {} -> {} canonical records\n",
            c.submissions, c.canonical_records
        ));
        output.push_str(&format!(
            "Participants: {}  Blocks: {}/{}\n",
            c.participants, c.observed_blocks, c.expected_blocks
        ));
        output.push_str(&format!("Output: {}\n", outdir.display()));
        output.push_str(&Self::format_warning_counts(&report.warning_counts));
        output
    }

    /// Format warning counts, or a clean bill
    ///
    /// Example: `Warnings: 3 (coercion: 2, block_count: 1)`
    pub fn format_warning_counts(counts: &BTreeMap<String, usize>) -> String {
        let total: usize = counts.values().sum();
        if total == 0 {
            return "Warnings: none\n".to_string();
        }
        let mut parts: Vec<(&String, &usize)> = counts.iter().collect();
        parts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        let detail: Vec<String> = parts.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
        format!(
            "Warnings: {} ({}) - inspect {} before use\n",
            total,
            detail.join(", "),
            LOG_FILE
        )
    }
}
