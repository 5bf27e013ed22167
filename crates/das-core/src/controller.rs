//! Candidate/attempt state machine for one node.
//!
//! For each attempt the controller consults the fault injector, then
//! generates up to `k` candidates strictly in order, evaluating each through
//! the bound gates. Passing candidates compete in the selector at the end of
//! the attempt. Every candidate is recorded as soon as it is evaluated, so a
//! crash leaves the current attempt in `retry` with the candidates seen so
//! far and no selection.
//!
//! ```text
//! retry -> selected
//!       -> retry      (more attempts left)
//!       -> exhausted  (last attempt)
//!       -> hard_fail  (a gate reported a fatal error)
//! disabled            (policy.enabled = false)
//! ```

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::digest::compute_digest;
use crate::domain::{
    bounded_detail, AttemptRecord, AttemptStatus, CandidateResult, EvalContext, NodeDecision,
    Policy, Result, SelectedRef,
};
use crate::faults::FaultInjector;
use crate::gate::{evaluate_candidate, BoundGates};
use crate::generator::{Generator, NodeInput};
use crate::metrics::METRICS;
use crate::obs::{
    emit_attempt_finished, emit_candidate_evaluated, emit_node_finished, emit_node_started,
};
use crate::provenance::{CandidateArtifact, DecisionRecorder};
use crate::selector;

/// Result of driving one node to a terminal status.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutcome {
    pub decision: NodeDecision,
    /// The winning artifact, when the node selected one.
    pub artifact: Option<Value>,
    /// Generator calls made.
    pub generations: u32,
}

impl NodeOutcome {
    pub fn status(&self) -> AttemptStatus {
        self.decision.status().unwrap_or(AttemptStatus::Retry)
    }
}

/// Drives a single node through its attempts.
pub struct AttemptController<'a> {
    generator: &'a dyn Generator,
    gates: &'a BoundGates,
    faults: &'a dyn FaultInjector,
}

impl<'a> AttemptController<'a> {
    pub fn new(
        generator: &'a dyn Generator,
        gates: &'a BoundGates,
        faults: &'a dyn FaultInjector,
    ) -> Self {
        Self {
            generator,
            gates,
            faults,
        }
    }

    /// Run the node described by `policy` and `input`.
    ///
    /// `ctx` carries run-level fields; attempt and candidate are filled in per
    /// slot. Only recorder failures are returned as errors; generation and
    /// gate failures end up in the decision.
    pub async fn run_node(
        &self,
        policy: &Policy,
        input: &NodeInput,
        ctx: &EvalContext,
        recorder: &mut dyn DecisionRecorder,
    ) -> Result<NodeOutcome> {
        let node_id = input.node_id.as_str();
        let mut decision = NodeDecision::new(node_id, policy.clone());
        let mut generations = 0u32;
        emit_node_started(node_id, policy.candidates_per_attempt, policy.max_attempts);

        if !policy.enabled {
            decision.attempts.push(AttemptRecord {
                attempt: 1,
                candidates: vec![CandidateResult::disabled()],
                selected_candidate: None,
                status: AttemptStatus::Disabled,
            });
            recorder.record_decision(&decision)?;
            emit_node_finished(node_id, AttemptStatus::Disabled, 0);
            return Ok(NodeOutcome {
                decision,
                artifact: None,
                generations,
            });
        }

        let mut winner_artifact = None;
        for attempt in 1..=policy.max_attempts {
            let no_winner = if attempt == policy.max_attempts {
                AttemptStatus::Exhausted
            } else {
                AttemptStatus::Retry
            };

            if let Some(reason) = self.faults.forced_failure(node_id, attempt) {
                debug!(node = %node_id, attempt, "forced failure injected");
                decision.attempts.push(AttemptRecord {
                    attempt,
                    candidates: vec![CandidateResult::forced_failure(attempt, reason)],
                    selected_candidate: None,
                    status: no_winner,
                });
                recorder.record_decision(&decision)?;
                emit_attempt_finished(node_id, attempt, no_winner);
                continue;
            }

            decision.attempts.push(AttemptRecord::open(attempt));
            let mut artifacts: Vec<Option<Value>> = Vec::new();
            let mut fatal = None;

            for candidate in 1..=policy.candidates_per_attempt {
                let offset = policy.template_offset(attempt, candidate);
                generations += 1;
                METRICS.inc_generations();

                let (result, output, error) = match self.generator.generate(input, offset).await {
                    Err(err) => {
                        METRICS.inc_generator_errors();
                        let msg = err.to_string();
                        warn!(
                            node = %node_id,
                            attempt,
                            candidate,
                            reason = err.reason_code(),
                            error = %bounded_detail(&msg),
                            "generator failed"
                        );
                        (
                            CandidateResult::generator_error(
                                attempt,
                                candidate,
                                err.reason_code(),
                                &msg,
                            ),
                            None,
                            Some(bounded_detail(&msg)),
                        )
                    }
                    Ok(artifact) => match compute_digest(&artifact) {
                        Err(err) => {
                            let msg = err.to_string();
                            (
                                CandidateResult::generator_error(
                                    attempt,
                                    candidate,
                                    "non_canonical_artifact",
                                    &msg,
                                ),
                                None,
                                Some(bounded_detail(&msg)),
                            )
                        }
                        Ok(digest) => {
                            let slot = ctx.for_candidate(attempt, candidate);
                            let eval = evaluate_candidate(self.gates, &artifact, &slot).await;
                            if fatal.is_none() {
                                fatal = eval.fatal.clone();
                            }
                            let result = CandidateResult::evaluated(
                                attempt,
                                candidate,
                                eval.results,
                                eval.score,
                                digest.as_str().to_string(),
                            );
                            (result, Some(artifact), None)
                        }
                    },
                };

                if result.ok {
                    METRICS.inc_candidates_passed();
                }
                emit_candidate_evaluated(node_id, attempt, candidate, result.ok, result.score);
                recorder.record_candidate(&CandidateArtifact {
                    run_id: ctx.run_id.clone(),
                    node_id: node_id.to_string(),
                    attempt,
                    candidate,
                    template_offset: offset,
                    input: input.clone(),
                    output: output.clone(),
                    error,
                    artifact_ref: result.artifact_ref.clone(),
                    created_at: Utc::now(),
                })?;

                artifacts.push(output);
                current(&mut decision).candidates.push(result);
                recorder.record_decision(&decision)?;

                if fatal.is_some() {
                    break;
                }
            }

            if let Some(reason) = fatal {
                warn!(node = %node_id, attempt, reason = %reason, "fatal gate error, ending node");
                current(&mut decision).status = AttemptStatus::HardFail;
                recorder.record_decision(&decision)?;
                emit_attempt_finished(node_id, attempt, AttemptStatus::HardFail);
                break;
            }

            let record = current(&mut decision);
            let winner = selector::pick(&record.candidates).map(|w| {
                let idx = record
                    .candidates
                    .iter()
                    .position(|c| c.candidate == w.candidate)
                    .unwrap_or_default();
                (
                    SelectedRef {
                        attempt,
                        candidate: w.candidate,
                        score: w.score,
                        artifact_ref: w.artifact_ref.clone().unwrap_or_default(),
                    },
                    idx,
                )
            });

            match winner {
                Some((selected, idx)) => {
                    record.status = AttemptStatus::Selected;
                    record.selected_candidate = Some(selected.candidate);
                    decision.selected = Some(selected);
                    winner_artifact = artifacts.get_mut(idx).and_then(Option::take);
                    recorder.record_decision(&decision)?;
                    emit_attempt_finished(node_id, attempt, AttemptStatus::Selected);
                    break;
                }
                None => {
                    record.status = no_winner;
                    recorder.record_decision(&decision)?;
                    emit_attempt_finished(node_id, attempt, no_winner);
                }
            }
        }

        let status = decision.status().unwrap_or(AttemptStatus::Exhausted);
        emit_node_finished(node_id, status, generations);
        Ok(NodeOutcome {
            decision,
            artifact: winner_artifact,
            generations,
        })
    }
}

fn current(decision: &mut NodeDecision) -> &mut AttemptRecord {
    // The caller pushes an attempt record before any candidate is recorded.
    let last = decision.attempts.len() - 1;
    &mut decision.attempts[last]
}
