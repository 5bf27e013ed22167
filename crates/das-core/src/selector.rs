//! Winner selection among evaluated candidates.
//!
//! Only `ok`, non-skipped candidates are eligible; a blocked candidate is
//! never chosen whatever its score. The highest score wins and ties go to
//! the earliest generated candidate (lower attempt, then lower index).
//! A NaN score ranks below every real score.

use std::cmp::Ordering;

use crate::domain::CandidateResult;

/// Best eligible candidate, or `None` if nothing passed.
pub fn pick(candidates: &[CandidateResult]) -> Option<&CandidateResult> {
    candidates
        .iter()
        .filter(|c| c.ok && !c.skipped)
        .fold(None, |best: Option<&CandidateResult>, c| match best {
            Some(b) if !beats(c, b) => Some(b),
            _ => Some(c),
        })
}

fn beats(challenger: &CandidateResult, incumbent: &CandidateResult) -> bool {
    match rank(challenger.score).total_cmp(&rank(incumbent.score)) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => {
            (challenger.attempt, challenger.candidate) < (incumbent.attempt, incumbent.candidate)
        }
    }
}

fn rank(score: f64) -> f64 {
    if score.is_nan() {
        f64::NEG_INFINITY
    } else {
        score
    }
}
