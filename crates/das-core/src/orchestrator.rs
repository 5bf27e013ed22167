//! Drives the fixed, ordered node pipeline for one run.
//!
//! Every node's policy is resolved and its gates bound before the first
//! generator call, so configuration errors surface without any generation
//! work. Nodes then run strictly in order; a node's selected artifact is
//! handed to the next node as upstream input.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{warn, Instrument};

use crate::config::PolicyConfig;
use crate::controller::AttemptController;
use crate::domain::{
    AttemptStatus, ConfigError, DasError, EvalContext, Mode, NodeDecision, OnHardFail, Policy,
    Result, RunSelection,
};
use crate::faults::{FaultInjector, NoFaults};
use crate::gate::{BoundGates, GateRegistry};
use crate::generator::{Generator, NodeInput};
use crate::metrics::{MetricsSnapshot, METRICS};
use crate::obs::{emit_run_finished, emit_run_started, RunSpan};
use crate::provenance::DecisionRecorder;

/// One pipeline stage.
#[derive(Clone)]
pub struct PipelineNode {
    pub node_id: String,
    pub generator: Arc<dyn Generator>,
    pub seed: Value,
}

impl PipelineNode {
    pub fn new(node_id: impl Into<String>, generator: Arc<dyn Generator>, seed: Value) -> Self {
        Self {
            node_id: node_id.into(),
            generator,
            seed,
        }
    }
}

/// Run-level parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub run_id: String,
    pub run_type: String,
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<Value>,
}

impl RunRequest {
    /// New request with a fresh v4 run id.
    pub fn new(run_type: impl Into<String>, mode: Mode) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            run_type: run_type.into(),
            mode,
            persona: None,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_persona(mut self, persona: Value) -> Self {
        self.persona = Some(persona);
        self
    }
}

/// Outcome of a run. An aborted run carries its partial report inside
/// [`DasError::RunAborted`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_id: String,
    /// In pipeline order.
    pub decisions: Vec<NodeDecision>,
    pub selection: RunSelection,
    /// Selected artifact per node.
    pub artifacts: BTreeMap<String, Value>,
    /// Nodes that ended `exhausted` or `hard_fail`.
    pub failed_nodes: Vec<String>,
    /// Node that stopped the run under `stop_run`.
    pub aborted_at: Option<String>,
    /// Counter movement while this run was in flight.
    pub metrics: MetricsSnapshot,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(run_id: impl Into<String>) -> Self {
        let run_id = run_id.into();
        Self {
            selection: RunSelection::new(&run_id),
            run_id,
            decisions: Vec::new(),
            artifacts: BTreeMap::new(),
            failed_nodes: Vec::new(),
            aborted_at: None,
            metrics: MetricsSnapshot::default(),
            duration_ms: 0,
        }
    }

    pub fn decision(&self, node_id: &str) -> Option<&NodeDecision> {
        self.decisions.iter().find(|d| d.node_id == node_id)
    }

    pub fn succeeded(&self) -> bool {
        self.failed_nodes.is_empty()
    }
}

/// A node with its resolved policy and bound gates.
#[derive(Debug, Clone)]
pub struct PreparedNode {
    pub node_id: String,
    pub policy: Policy,
    pub gates: BoundGates,
}

pub struct Orchestrator {
    config: PolicyConfig,
    registry: GateRegistry,
    faults: Box<dyn FaultInjector>,
}

impl Orchestrator {
    /// Orchestrator without fault injection.
    ///
    /// A `test_only` block in `config` is not applied here; pass
    /// `config.forced_failures()` to [`with_faults`](Self::with_faults).
    pub fn new(config: PolicyConfig, registry: GateRegistry) -> Self {
        if !config.forced_failures().is_empty() {
            warn!("policy config has test_only.force_failure entries that will not be applied");
        }
        Self {
            config,
            registry,
            faults: Box::new(NoFaults),
        }
    }

    pub fn with_faults(mut self, faults: Box<dyn FaultInjector>) -> Self {
        self.faults = faults;
        self
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Resolve and bind every node. Fails on the first configuration error.
    pub fn prepare(
        &self,
        nodes: &[PipelineNode],
    ) -> std::result::Result<Vec<PreparedNode>, ConfigError> {
        let mut seen = BTreeSet::new();
        let mut prepared = Vec::with_capacity(nodes.len());
        for node in nodes {
            if !seen.insert(node.node_id.as_str()) {
                return Err(ConfigError::DuplicateNode(node.node_id.clone()));
            }
            let policy = self.config.resolve(&node.node_id)?;
            let gates = self.registry.bind(
                &node.node_id,
                &policy,
                self.config.unknown_gate_policy,
                self.config.strict_gates,
            )?;
            prepared.push(PreparedNode {
                node_id: node.node_id.clone(),
                policy,
                gates,
            });
        }
        for configured in self.config.nodes.keys() {
            if !seen.contains(configured.as_str()) {
                warn!(node = %configured, "policy configured for a node not in the pipeline");
            }
        }
        Ok(prepared)
    }

    /// Run `nodes` in order.
    ///
    /// Returns [`DasError::RunAborted`] when a node fails under `stop_run`;
    /// the recorder holds the provenance up to that point.
    pub async fn run(
        &self,
        request: &RunRequest,
        nodes: &[PipelineNode],
        recorder: &mut dyn DecisionRecorder,
    ) -> Result<RunReport> {
        self.run_inner(request, nodes, recorder)
            .instrument(RunSpan::span(&request.run_id))
            .await
    }

    async fn run_inner(
        &self,
        request: &RunRequest,
        nodes: &[PipelineNode],
        recorder: &mut dyn DecisionRecorder,
    ) -> Result<RunReport> {
        let started = Instant::now();
        let baseline = METRICS.snapshot();
        emit_run_started(&request.run_id, &request.run_type, request.mode, nodes.len());
        let prepared = self.prepare(nodes)?;

        let mut report = RunReport::new(&request.run_id);
        let mut upstream: Option<(String, Value)> = None;

        for (node, prep) in nodes.iter().zip(&prepared) {
            let mut input = NodeInput::new(&node.node_id, node.seed.clone());
            if let Some((from, artifact)) = upstream.take() {
                input = input.with_upstream(from, artifact);
            }
            let ctx = EvalContext {
                run_id: request.run_id.clone(),
                node_id: node.node_id.clone(),
                run_type: request.run_type.clone(),
                attempt: 0,
                candidate: 0,
                mode: request.mode,
                persona: request.persona.clone(),
            };

            let controller =
                AttemptController::new(node.generator.as_ref(), &prep.gates, self.faults.as_ref());
            let outcome = controller
                .run_node(&prep.policy, &input, &ctx, recorder)
                .await?;
            let status = outcome.status();

            if let (Some(selected), Some(artifact)) = (&outcome.decision.selected, outcome.artifact)
            {
                report
                    .selection
                    .selected
                    .insert(node.node_id.clone(), selected.clone());
                report
                    .artifacts
                    .insert(node.node_id.clone(), artifact.clone());
                upstream = Some((node.node_id.clone(), artifact));
            }
            report.decisions.push(outcome.decision);

            if status.is_failure() {
                report.failed_nodes.push(node.node_id.clone());
                if prep.policy.on_hard_fail == OnHardFail::StopRun {
                    report.aborted_at = Some(node.node_id.clone());
                    finish(&mut report, started, &baseline, false);
                    return Err(DasError::RunAborted {
                        node_id: node.node_id.clone(),
                        status,
                        report: Box::new(report),
                    });
                }
                warn!(node = %node.node_id, status = %status, "node failed, continuing");
            }
        }

        let success = report.succeeded();
        finish(&mut report, started, &baseline, success);
        Ok(report)
    }
}

fn finish(report: &mut RunReport, started: Instant, baseline: &MetricsSnapshot, success: bool) {
    report.duration_ms = started.elapsed().as_millis() as u64;
    report.metrics = METRICS.snapshot().since(baseline);
    emit_run_finished(
        &report.run_id,
        report.duration_ms,
        report.selection.selected.len(),
        success,
    );
    METRICS.flush_run(&report.run_id, &report.metrics);
}

/// Status of every node in a report, for quick assertions and summaries.
pub fn node_statuses(report: &RunReport) -> Vec<(String, AttemptStatus)> {
    report
        .decisions
        .iter()
        .filter_map(|d| d.status().map(|s| (d.node_id.clone(), s)))
        .collect()
}
