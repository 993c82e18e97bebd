//! Pipeline orchestration
//!
//! Loader -> Resolver -> Classifier -> Block observations -> Long / Wide ->
//! Statistics and Audit. Each stage consumes only the previous stage's output;
//! all warnings collect in one `Diagnostics` returned with the tables.

use crate::audit::{AuditReport, IntegrityAuditor};
use crate::blocks::{self, BlockPositions};
use crate::classifier;
use crate::diagnostics::Diagnostics;
use crate::error::EngineResult;
use crate::export::{self, TableWriter};
use crate::loader::RecordLoader;
use crate::long_form::{self, LongRow};
use crate::model::{CanonicalRecord, RawSubmission};
use crate::report::{self, RunReport};
use crate::resolver;
use crate::session::{self, ConstructRow, EndOutcomeRow, ParticipantsTable, QualitativeNote};
use crate::stats::{self, StatsReport};
use crate::wide_form::{self, WideRow};
use rmsa_common::config::AnalysisSettings;
use rmsa_common::StudyDesign;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Everything one run derives from its input
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Submissions produced by the loader (before resolution)
    pub submissions: usize,
    pub canonical: Vec<CanonicalRecord>,
    pub long: Vec<LongRow>,
    pub wide: Vec<WideRow>,
    pub stats: StatsReport,
    pub audit: AuditReport,
    pub participants: ParticipantsTable,
    pub end_outcomes: Vec<EndOutcomeRow>,
    pub qualitative_notes: Vec<QualitativeNote>,
    pub constructs: Vec<ConstructRow>,
    pub diagnostics: Diagnostics,
}

/// Files produced by `Pipeline::run_to_dir`
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    pub report: RunReport,
    pub tables: Vec<PathBuf>,
    pub log: PathBuf,
    pub summary: PathBuf,
}

/// One configured analysis
pub struct Pipeline {
    design: StudyDesign,
    settings: AnalysisSettings,
}

impl Pipeline {
    pub fn new(design: StudyDesign, settings: AnalysisSettings) -> Self {
        Self { design, settings }
    }

    pub fn design(&self) -> &StudyDesign {
        &self.design
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Load and analyse an input file
    pub fn run_path(&self, path: &Path) -> EngineResult<PipelineOutput> {
        let mut diag = Diagnostics::new();
        let loader = RecordLoader::new(&self.design, self.settings.max_depth);
        let submissions = loader.load_path(path, &mut diag)?;
        Ok(self.run_submissions(submissions, diag))
    }

    /// Analyse an already-parsed JSON document
    pub fn run_value(&self, value: &Value) -> PipelineOutput {
        let mut diag = Diagnostics::new();
        let loader = RecordLoader::new(&self.design, self.settings.max_depth);
        let submissions = loader.load_value(value, &mut diag);
        self.run_submissions(submissions, diag)
    }

    /// Analyse loaded submissions, continuing an existing warning log
    pub fn run_submissions(&self, submissions: Vec<RawSubmission>, mut diag: Diagnostics) -> PipelineOutput {
        let design = &self.design;
        let submitted = submissions.len();

        let canonical = resolver::resolve(submissions);
        let classified = classifier::classify(&canonical, design, &mut diag);
        let observations = blocks::observe(&classified, design, &mut diag);
        let positions = BlockPositions::compute(&observations);

        let long = long_form::build(&observations, &classified, &positions, design, &mut diag);
        let wide = wide_form::build(&observations, &positions, design);

        let stats = stats::analyze(&wide, design, &self.settings, &mut diag);
        let audit = IntegrityAuditor::new(design).audit(
            &canonical,
            &classified,
            &long,
            &wide,
            &positions,
            &mut diag,
        );

        let participants = session::participants(&canonical, &classified);
        let end_outcomes = session::end_outcomes(&long, &classified, design);
        let qualitative_notes = session::qualitative_notes(&classified, design);
        let constructs = session::constructs(design);

        info!(
            submissions = submitted,
            canonical = canonical.len(),
            long_rows = long.len(),
            wide_rows = wide.len(),
            warnings = diag.len(),
            "Pipeline complete"
        );

        PipelineOutput {
            submissions: submitted,
            canonical,
            long,
            wide,
            stats,
            audit,
            participants,
            end_outcomes,
            qualitative_notes,
            constructs,
            diagnostics: diag,
        }
    }

    /// Run on `input` and write tables, `log.txt` and `summary.json` to `outdir`
    pub fn run_to_dir(&self, input: &Path, outdir: &Path) -> EngineResult<(PipelineOutput, RunArtifacts)> {
        let output = self.run_path(input)?;

        let input_sha256 = match report::sha256_file(input) {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!(path = %input.display(), error = %e, "Could not hash input file");
                None
            }
        };

        let mut writer = TableWriter::create(outdir)?;
        export::write_tables(&mut writer, &output, &self.design)?;

        let report = RunReport::new(input, input_sha256, &self.settings, &output);
        let log = writer.outdir().join(report::LOG_FILE);
        let summary = writer.outdir().join(report::SUMMARY_FILE);
        report.write_log(&log)?;
        report.export_json(&summary)?;

        let artifacts = RunArtifacts {
            report,
            tables: writer.written().to_vec(),
            log,
            summary,
        };
        Ok((output, artifacts))
    }
}
