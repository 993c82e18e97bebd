//! Section Classifier
//!
//! Maps each canonical record's section key onto either a condition block
//! (`block_<condition>_<phase>`) or a literal session-level section. Anything
//! else is ignored with an `UnknownVocabulary` note; block keys naming a
//! condition outside the design's alphabet are rejected the same way.

use crate::diagnostics::{Diagnostics, WarningKind};
use crate::model::CanonicalRecord;
use rmsa_common::{Phase, StudyDesign};
use std::collections::BTreeMap;
use tracing::debug;

const BLOCK_PREFIX: &str = "block_";

/// Classification of one section key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionKind {
    Block { condition: String, phase: Phase },
    Session(String),
}

/// Reason a section key was not classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unclassified {
    /// Block-shaped key with a condition outside the alphabet
    UnknownCondition(String),
    /// Block-shaped key with a phase other than pre/post
    UnknownPhase(String),
    /// Neither block-shaped nor a known session section
    UnknownSection,
}

/// Canonical record paired with its classification
#[derive(Debug, Clone)]
pub struct ClassifiedRecord<'a> {
    pub kind: SectionKind,
    pub record: &'a CanonicalRecord,
}

impl<'a> ClassifiedRecord<'a> {
    pub fn is_session(&self, name: &str) -> bool {
        matches!(&self.kind, SectionKind::Session(s) if s == name)
    }

    pub fn block(&self) -> Option<(&str, Phase)> {
        match &self.kind {
            SectionKind::Block { condition, phase } => Some((condition.as_str(), *phase)),
            SectionKind::Session(_) => None,
        }
    }
}

/// Classify a single section key
pub fn classify_key(key: &str, design: &StudyDesign) -> Result<SectionKind, Unclassified> {
    if let Some(rest) = key.strip_prefix(BLOCK_PREFIX) {
        if let Some((condition, phase)) = rest.rsplit_once('_') {
            let phase = Phase::from_block_suffix(phase)
                .ok_or_else(|| Unclassified::UnknownPhase(phase.to_string()))?;
            if !design.is_condition(condition) {
                return Err(Unclassified::UnknownCondition(condition.to_string()));
            }
            return Ok(SectionKind::Block {
                condition: condition.to_string(),
                phase,
            });
        }
    }

    if design.is_session_section(key) {
        Ok(SectionKind::Session(key.to_string()))
    } else {
        Err(Unclassified::UnknownSection)
    }
}

/// Classify canonical records, preserving their order
///
/// One warning is raised per distinct unrecognized key, with the number of
/// records carrying it.
pub fn classify<'a>(
    records: &'a [CanonicalRecord],
    design: &StudyDesign,
    diag: &mut Diagnostics,
) -> Vec<ClassifiedRecord<'a>> {
    let mut out = Vec::with_capacity(records.len());
    let mut ignored: BTreeMap<&str, (Unclassified, usize)> = BTreeMap::new();

    for record in records {
        match classify_key(record.section_key(), design) {
            Ok(kind) => out.push(ClassifiedRecord { kind, record }),
            Err(reason) => {
                ignored
                    .entry(record.section_key())
                    .or_insert((reason, 0))
                    .1 += 1;
            }
        }
    }

    for (key, (reason, count)) in ignored {
        let detail = match reason {
            Unclassified::UnknownCondition(c) => format!("unknown condition {:?}", c),
            Unclassified::UnknownPhase(p) => format!("unknown phase {:?}", p),
            Unclassified::UnknownSection => "unrecognized section".to_string(),
        };
        diag.push(
            WarningKind::UnknownVocabulary,
            format!("Ignoring section {:?} ({}) on {} record(s)", key, detail, count),
        );
    }

    debug!(classified = out.len(), total = records.len(), "Sections classified");
    out
}
