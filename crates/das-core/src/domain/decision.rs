//! Evaluation records and the provenance documents built from them.
//!
//! `GateResult` and `CandidateResult` are created once and never mutated.
//! `NodeDecision` grows monotonically across attempts; `RunSelection` holds
//! only the winners.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::{DasError, Result};
use crate::domain::policy::Policy;
use crate::domain::severity::Severity;

// ---------------------------------------------------------------------------
// Gate and candidate results
// ---------------------------------------------------------------------------

/// Outcome of one gate on one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub gate_id: String,
    pub ok: bool,
    pub severity: Severity,
    pub score: f64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl GateResult {
    /// Passing result with the given score.
    pub fn pass(gate_id: impl Into<String>, score: f64) -> Self {
        Self {
            gate_id: gate_id.into(),
            ok: true,
            severity: Severity::Info,
            score,
            reason: "ok".to_string(),
            data: None,
        }
    }

    /// Failing result at `severity`.
    pub fn fail(gate_id: impl Into<String>, severity: Severity, reason: impl Into<String>) -> Self {
        Self {
            gate_id: gate_id.into(),
            ok: false,
            severity,
            score: 0.0,
            reason: reason.into(),
            data: None,
        }
    }

    /// Non-blocking `info` record for a check that did not run.
    pub fn skipped(gate_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            gate_id: gate_id.into(),
            ok: true,
            severity: Severity::Info,
            score: 0.0,
            reason: reason.into(),
            data: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Whether this result prevents the candidate from being selected.
    ///
    /// Only a non-ok `hard_fail` blocks. Non-ok `warn` is recorded only.
    pub fn blocks(&self) -> bool {
        !self.ok && self.severity == Severity::HardFail
    }
}

/// One generated (or attempted) candidate and its evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub attempt: u32,
    pub candidate: u32,
    pub ok: bool,
    pub score: f64,
    pub gates: Vec<GateResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,
    /// Reason code when the slot produced no gated artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Underlying message for `error`, at most [`MAX_DETAIL_CHARS`] chars.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
}

/// Cap on free-form error text stored in decision records.
pub const MAX_DETAIL_CHARS: usize = 256;

/// `message` cut to [`MAX_DETAIL_CHARS`] chars on a char boundary.
pub fn bounded_detail(message: &str) -> String {
    match message.char_indices().nth(MAX_DETAIL_CHARS) {
        Some((cut, _)) => format!("{}...", &message[..cut]),
        None => message.to_string(),
    }
}

impl CandidateResult {
    /// Candidate whose artifact went through the gates.
    pub fn evaluated(
        attempt: u32,
        candidate: u32,
        gates: Vec<GateResult>,
        score: f64,
        artifact_ref: String,
    ) -> Self {
        let ok = !gates.iter().any(GateResult::blocks);
        Self {
            attempt,
            candidate,
            ok,
            score,
            gates,
            artifact_ref: Some(artifact_ref),
            error: None,
            detail: None,
            skipped: false,
        }
    }

    /// Candidate slot consumed by a generator error.
    pub fn generator_error(
        attempt: u32,
        candidate: u32,
        code: impl Into<String>,
        message: &str,
    ) -> Self {
        Self {
            attempt,
            candidate,
            ok: false,
            score: 0.0,
            gates: Vec::new(),
            artifact_ref: None,
            error: Some(code.into()),
            detail: Some(bounded_detail(message)),
            skipped: false,
        }
    }

    /// Synthetic failure injected for an attempt; no generation happened.
    pub fn forced_failure(attempt: u32, reason: impl Into<String>) -> Self {
        Self {
            attempt,
            candidate: 1,
            ok: false,
            score: 0.0,
            gates: Vec::new(),
            artifact_ref: None,
            error: Some(reason.into()),
            detail: None,
            skipped: true,
        }
    }

    /// Inert record for a disabled node.
    pub fn disabled() -> Self {
        Self {
            attempt: 1,
            candidate: 1,
            ok: false,
            score: 0.0,
            gates: Vec::new(),
            artifact_ref: None,
            error: None,
            detail: None,
            skipped: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Node decisions
// ---------------------------------------------------------------------------

/// Status of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// No winner yet; another attempt follows (also the in-progress state).
    Retry,
    Selected,
    HardFail,
    /// Last attempt finished without a winner.
    Exhausted,
    Disabled,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::Selected => "selected",
            Self::HardFail => "hard_fail",
            Self::Exhausted => "exhausted",
            Self::Disabled => "disabled",
        }
    }

    /// Whether a node ending in this status failed.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::HardFail | Self::Exhausted)
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All candidates of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub candidates: Vec<CandidateResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_candidate: Option<u32>,
    pub status: AttemptStatus,
}

impl AttemptRecord {
    pub fn open(attempt: u32) -> Self {
        Self {
            attempt,
            candidates: Vec::new(),
            selected_candidate: None,
            status: AttemptStatus::Retry,
        }
    }
}

/// Pointer to a node's winning candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedRef {
    pub attempt: u32,
    pub candidate: u32,
    pub score: f64,
    pub artifact_ref: String,
}

/// Full decision history for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDecision {
    pub node_id: String,
    pub policy: Policy,
    pub attempts: Vec<AttemptRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<SelectedRef>,
}

impl NodeDecision {
    pub fn new(node_id: impl Into<String>, policy: Policy) -> Self {
        Self {
            node_id: node_id.into(),
            policy,
            attempts: Vec::new(),
            selected: None,
        }
    }

    /// Status of the most recent attempt, if any.
    pub fn status(&self) -> Option<AttemptStatus> {
        self.attempts.last().map(|a| a.status)
    }

    /// Every candidate across every attempt, in generation order.
    pub fn candidates(&self) -> impl Iterator<Item = &CandidateResult> {
        self.attempts.iter().flat_map(|a| a.candidates.iter())
    }

    /// Check that every `selected` pointer has a matching ok candidate.
    pub fn validate(&self) -> Result<()> {
        for record in &self.attempts {
            match (record.status, record.selected_candidate) {
                (AttemptStatus::Selected, Some(idx)) => {
                    let found = record
                        .candidates
                        .iter()
                        .any(|c| c.candidate == idx && c.ok);
                    if !found {
                        return Err(DasError::InvalidDecision(format!(
                            "node {} attempt {} selects candidate {} without an ok result",
                            self.node_id, record.attempt, idx
                        )));
                    }
                }
                (AttemptStatus::Selected, None) => {
                    return Err(DasError::InvalidDecision(format!(
                        "node {} attempt {} is selected without a candidate",
                        self.node_id, record.attempt
                    )));
                }
                (_, Some(idx)) => {
                    return Err(DasError::InvalidDecision(format!(
                        "node {} attempt {} has candidate {} but status {}",
                        self.node_id, record.attempt, idx, record.status
                    )));
                }
                _ => {}
            }
        }

        if let Some(sel) = &self.selected {
            let winner = self
                .attempts
                .iter()
                .find(|a| a.attempt == sel.attempt && a.status == AttemptStatus::Selected)
                .and_then(|a| a.candidates.iter().find(|c| c.candidate == sel.candidate));
            match winner {
                Some(c) if c.ok && c.artifact_ref.as_deref() == Some(sel.artifact_ref.as_str()) => {
                }
                _ => {
                    return Err(DasError::InvalidDecision(format!(
                        "node {} selection {}/{} has no matching winning candidate",
                        self.node_id, sel.attempt, sel.candidate
                    )))
                }
            }
        }
        Ok(())
    }
}

/// Winners only, one entry per node that produced one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSelection {
    pub run_id: String,
    pub selected: BTreeMap<String, SelectedRef>,
}

impl RunSelection {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            selected: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::OnHardFail;

    fn policy() -> Policy {
        Policy {
            enabled: true,
            candidates_per_attempt: 1,
            max_attempts: 1,
            gates: vec![],
            on_hard_fail: OnHardFail::StopRun,
            params: BTreeMap::new(),
        }
    }

    #[test]
    fn warn_failure_does_not_block() {
        let warn = GateResult::fail("tone", Severity::Warn, "too formal");
        let hard = GateResult::fail("structural", Severity::HardFail, "missing field");
        let info = GateResult::skipped("judge", "judge_unavailable");
        assert!(!warn.blocks());
        assert!(hard.blocks());
        assert!(!info.blocks());

        let c = CandidateResult::evaluated(1, 1, vec![warn, info], 1.0, "ref".into());
        assert!(c.ok);
    }

    #[test]
    fn hard_fail_makes_candidate_not_ok() {
        let c = CandidateResult::evaluated(
            1,
            1,
            vec![
                GateResult::pass("bounds", 1.0),
                GateResult::fail("structural", Severity::HardFail, "missing"),
            ],
            1.0,
            "ref".into(),
        );
        assert!(!c.ok);
    }

    #[test]
    fn validate_rejects_dangling_selection() {
        let mut d = NodeDecision::new("n", policy());
        let mut a = AttemptRecord::open(1);
        a.candidates
            .push(CandidateResult::generator_error(1, 1, "generator_failed", "boom"));
        a.status = AttemptStatus::Selected;
        a.selected_candidate = Some(1);
        d.attempts.push(a);
        assert!(d.validate().is_err());
    }

    #[test]
    fn validate_accepts_consistent_selection() {
        let mut d = NodeDecision::new("n", policy());
        let mut a = AttemptRecord::open(1);
        a.candidates.push(CandidateResult::evaluated(
            1,
            1,
            vec![GateResult::pass("g", 1.0)],
            1.0,
            "abc".into(),
        ));
        a.status = AttemptStatus::Selected;
        a.selected_candidate = Some(1);
        d.attempts.push(a);
        d.selected = Some(SelectedRef {
            attempt: 1,
            candidate: 1,
            score: 1.0,
            artifact_ref: "abc".into(),
        });
        d.validate().unwrap();
        assert_eq!(d.status(), Some(AttemptStatus::Selected));
    }

    #[test]
    fn candidate_optional_fields_are_omitted() {
        let c = CandidateResult::generator_error(2, 1, "generator_timeout", "timed out");
        let v = serde_json::to_value(&c).unwrap();
        assert!(v.get("artifact_ref").is_none());
        assert!(v.get("skipped").is_none());
        assert_eq!(v["error"], "generator_timeout");
        assert_eq!(v["detail"], "timed out");

        let evaluated = CandidateResult::evaluated(1, 1, vec![], 1.0, "abc".into());
        assert!(serde_json::to_value(&evaluated).unwrap().get("detail").is_none());
    }

    #[test]
    fn long_error_detail_is_bounded_on_char_boundary() {
        let short = "upstream said no";
        assert_eq!(bounded_detail(short), short);

        let long = "é".repeat(MAX_DETAIL_CHARS + 40);
        let cut = bounded_detail(&long);
        assert_eq!(cut.chars().count(), MAX_DETAIL_CHARS + 3);
        assert!(cut.ends_with("..."));

        let c = CandidateResult::generator_error(1, 1, "generator_failed", &long);
        assert_eq!(c.error.as_deref(), Some("generator_failed"));
        assert_eq!(c.detail, Some(cut));
    }
}
