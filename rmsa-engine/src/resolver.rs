//! Latest-Wins Resolver
//!
//! Collapses every group of submissions sharing `(participant_id, section_key)`
//! into one `CanonicalRecord`.
//!
//! # Selection order
//! Candidates are compared on the key `(has_timestamp, timestamp, sequence_index)`:
//! 1. A candidate with a parsed timestamp beats one without
//! 2. Between two timestamps the later wins
//! 3. Equal or absent timestamps fall back to the later `sequence_index`
//!
//! The comparison is a total order over distinct sequence indices, so the fold
//! result does not depend on input order. Resolving the resolver's own output
//! returns it unchanged.

use crate::model::{CanonicalRecord, RawSubmission};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Order two submissions for the same key; `Greater` means `a` wins
pub fn precedence(a: &RawSubmission, b: &RawSubmission) -> Ordering {
    let key = |s: &RawSubmission| (s.timestamp.is_some(), s.timestamp, s.sequence_index);
    key(a).cmp(&key(b))
}

/// Pick the winner of two candidates; the incumbent `a` survives exact ties
pub fn prefer(a: CanonicalRecord, b: CanonicalRecord) -> CanonicalRecord {
    let candidates = a.candidates + b.candidates;
    let mut winner = match precedence(&b.submission, &a.submission) {
        Ordering::Greater => b,
        _ => a,
    };
    winner.candidates = candidates;
    winner
}

/// Resolve raw submissions to canonical records ordered by key
pub fn resolve<I>(submissions: I) -> Vec<CanonicalRecord>
where
    I: IntoIterator<Item = RawSubmission>,
{
    resolve_records(submissions.into_iter().map(|submission| CanonicalRecord {
        submission,
        candidates: 1,
    }))
}

/// Fold already-canonical records (or singleton wrappers) by key
pub fn resolve_records<I>(records: I) -> Vec<CanonicalRecord>
where
    I: IntoIterator<Item = CanonicalRecord>,
{
    let mut by_key: BTreeMap<(String, String), CanonicalRecord> = BTreeMap::new();
    let mut seen = 0usize;

    for record in records {
        seen += 1;
        let key = (
            record.participant_id().to_string(),
            record.section_key().to_string(),
        );
        let merged = match by_key.remove(&key) {
            Some(existing) => {
                debug!(
                    participant_id = %key.0,
                    section = %key.1,
                    "Duplicate submission; applying latest-wins"
                );
                prefer(existing, record)
            }
            None => record,
        };
        by_key.insert(key, merged);
    }

    info!(input = seen, canonical = by_key.len(), "Submissions resolved");
    by_key.into_values().collect()
}
