//! # RMSA Engine
//!
//! Reconciliation and statistics engine for repeated-measures survey exports.
//!
//! **Stages:** Loader -> Latest-Wins Resolver -> Section Classifier ->
//! Long-Form Builder -> Wide-Form Builder & Composite Engine ->
//! Hypothesis Testing -> Integrity Auditor
//!
//! Every stage takes the study design by reference and reports non-fatal data
//! problems through a shared `Diagnostics` log. Only unparsable input is fatal.

pub mod audit;
pub mod blocks;
pub mod classifier;
pub mod composite;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod loader;
pub mod long_form;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod session;
pub mod stats;
pub mod wide_form;

pub use diagnostics::{Diagnostics, Warning, WarningKind};
pub use error::{EngineError, EngineResult};
pub use model::{CanonicalRecord, RawSubmission};
pub use pipeline::{Pipeline, PipelineOutput, RunArtifacts};
