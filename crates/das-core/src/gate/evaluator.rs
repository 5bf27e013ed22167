//! Runs a candidate through its bound gates.
//!
//! Every configured gate is evaluated (no short-circuit) so the provenance
//! record is complete. The aggregate score is the weighted sum of gate
//! scores; the evaluator does not normalize. The aggregate `ok` is false as
//! soon as any result blocks.

use serde_json::json;
use tracing::{debug, warn};

use crate::domain::{bounded_detail, EvalContext, GateResult, Severity, UnknownGatePolicy};
use crate::gate::registry::{BoundGate, BoundGates};
use crate::gate::GateError;

/// Aggregate outcome for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub results: Vec<GateResult>,
    pub ok: bool,
    pub score: f64,
    /// Reason of the first fatal gate error, if any.
    pub fatal: Option<String>,
}

/// Evaluate `artifact` against every gate in `bound`.
pub async fn evaluate_candidate(
    bound: &BoundGates,
    artifact: &serde_json::Value,
    ctx: &EvalContext,
) -> Evaluation {
    let mut results = Vec::with_capacity(bound.gates.len());
    let mut score = 0.0;
    let mut fatal = None;

    for entry in &bound.gates {
        let (mut result, fatal_reason) = run_one(entry, bound.unknown, artifact, ctx).await;

        // The configured id is authoritative in provenance.
        result.gate_id = entry.instance.gate_id.clone();
        if !result.ok {
            if let Some(severity) = entry.instance.severity_override {
                result.severity = severity;
            }
        }
        if fatal.is_none() {
            fatal = fatal_reason;
        }

        score += result.score * entry.instance.weight();
        debug!(
            gate = %result.gate_id,
            ok = result.ok,
            severity = %result.severity,
            score = result.score,
            "gate evaluated"
        );
        results.push(result);
    }

    let ok = !results.iter().any(GateResult::blocks);
    Evaluation {
        results,
        ok,
        score,
        fatal,
    }
}

async fn run_one(
    entry: &BoundGate,
    unknown: UnknownGatePolicy,
    artifact: &serde_json::Value,
    ctx: &EvalContext,
) -> (GateResult, Option<String>) {
    let gate_id = entry.instance.gate_id.as_str();
    let (gate, params) = match (&entry.gate, &entry.params) {
        (Some(gate), Some(params)) => (gate, params),
        _ => return (unknown_gate_result(gate_id, unknown), None),
    };

    let budget = entry.instance.retries();
    let mut invocations = 0u32;
    loop {
        invocations += 1;
        match gate.run(artifact, params, ctx).await {
            Ok(result) => return (result, None),
            Err(GateError::Transient(err)) if invocations <= budget => {
                warn!(gate = %gate_id, attempt = invocations, error = %err, "transient gate error, retrying");
            }
            Err(err) => {
                let code = err.reason_code().to_string();
                let (data, fatal) = match &err {
                    GateError::Transient(message) => (
                        json!({ "error": bounded_detail(message), "invocations": invocations }),
                        None,
                    ),
                    GateError::Fatal { detail, .. } => {
                        let detail = bounded_detail(detail);
                        warn!(gate = %gate_id, reason = %code, detail = %detail, "fatal gate error");
                        (json!({ "detail": detail }), Some(code.clone()))
                    }
                };
                let result = GateResult::fail(gate_id, Severity::HardFail, code).with_data(data);
                return (result, fatal);
            }
        }
    }
}

fn unknown_gate_result(gate_id: &str, policy: UnknownGatePolicy) -> GateResult {
    match policy {
        UnknownGatePolicy::HardFail => {
            GateResult::fail(gate_id, Severity::HardFail, "not_implemented")
        }
        UnknownGatePolicy::Warn => GateResult::fail(gate_id, Severity::Warn, "not_implemented"),
        UnknownGatePolicy::Skip => GateResult::skipped(gate_id, "not_implemented"),
    }
}
