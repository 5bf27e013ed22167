//! Structured observability hooks for the scheduler lifecycle.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `RunSpan` RAII guard
//! - Emission functions for run, node, attempt and candidate events
//!
//! Events are emitted at `info!` level with an `event=` key so they can be
//! filtered out of JSON logs (`DAS_LOG_FORMAT=json`).

use tracing::{info, warn};

use crate::domain::{AttemptStatus, Mode};

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// ```ignore
/// let _span = RunSpan::enter("run-12345");
/// // every event below carries run_id = "run-12345"
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        Self {
            _span: Self::span(run_id).entered(),
        }
    }

    /// The run span itself, for instrumenting futures.
    pub fn span(run_id: &str) -> tracing::Span {
        tracing::info_span!("das.run", run_id = %run_id)
    }
}

pub fn emit_run_started(run_id: &str, run_type: &str, mode: Mode, nodes: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        run_type = %run_type,
        mode = %mode,
        nodes = nodes,
    );
}

/// Emit event: node started with its generation budget.
pub fn emit_node_started(node_id: &str, candidates_per_attempt: u32, max_attempts: u32) {
    info!(
        event = "node.started",
        node_id = %node_id,
        candidates_per_attempt = candidates_per_attempt,
        max_attempts = max_attempts,
    );
}

pub fn emit_candidate_evaluated(node_id: &str, attempt: u32, candidate: u32, ok: bool, score: f64) {
    info!(
        event = "candidate.evaluated",
        node_id = %node_id,
        attempt = attempt,
        candidate = candidate,
        ok = ok,
        score = score,
    );
}

pub fn emit_attempt_finished(node_id: &str, attempt: u32, status: AttemptStatus) {
    info!(
        event = "attempt.finished",
        node_id = %node_id,
        attempt = attempt,
        status = %status,
    );
}

/// Emit event: node reached a terminal status. Failures log at `warn!`.
pub fn emit_node_finished(node_id: &str, status: AttemptStatus, generations: u32) {
    if status.is_failure() {
        warn!(
            event = "node.finished",
            node_id = %node_id,
            status = %status,
            generations = generations,
        );
    } else {
        info!(
            event = "node.finished",
            node_id = %node_id,
            status = %status,
            generations = generations,
        );
    }
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, selected: usize, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        selected = selected,
        success = success,
    );
}

/// Emit event: golden scorecard lookup.
pub fn emit_judge_cache(rubric: &str, key: &str, hit: bool) {
    info!(event = "judge.cache", rubric = %rubric, key = %key, hit = hit);
}
