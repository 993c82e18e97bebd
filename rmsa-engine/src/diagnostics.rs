//! Non-fatal warning accumulation
//!
//! Each stage reports data problems through a `Diagnostics` value. Every push
//! is also emitted as a `tracing` warning so the console and `log.txt` agree.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Category of a non-fatal condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Candidate record lacked identifying fields
    RecordSkipped,
    /// Likert value present but not a usable number
    Coercion,
    /// Statistical test lacked complete-case participants
    DesignIncomplete,
    /// Categorical label outside the known vocabulary
    UnknownVocabulary,
    /// Observed block count differs from participants x conditions
    BlockCount,
    /// Declared order string does not decode to one of each condition
    OrderDeclaration,
    /// Valid declared order disagrees with observed block positions
    OrderMismatch,
    /// Missing Likert responses in present blocks
    Missingness,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::RecordSkipped => "record_skipped",
            WarningKind::Coercion => "coercion",
            WarningKind::DesignIncomplete => "design_incomplete",
            WarningKind::UnknownVocabulary => "unknown_vocabulary",
            WarningKind::BlockCount => "block_count",
            WarningKind::OrderDeclaration => "order_declaration",
            WarningKind::OrderMismatch => "order_mismatch",
            WarningKind::Missingness => "missingness",
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One accumulated warning
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Warning log for one pipeline run
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and emit it through tracing
    pub fn push(&mut self, kind: WarningKind, message: impl Into<String>) {
        let message = message.into();
        warn!(kind = %kind, "{}", message);
        self.warnings.push(Warning { kind, message });
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    /// Number of warnings of one kind
    pub fn count(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }

    /// Warning counts keyed by kind name
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for w in &self.warnings {
            *counts.entry(w.kind.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn of_kind(&self, kind: WarningKind) -> impl Iterator<Item = &Warning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }
}
