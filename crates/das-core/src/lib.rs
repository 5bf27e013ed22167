//! DAS core library.
//!
//! A generation scheduler with quality gating: drives repeated calls to an
//! external content generator, evaluates every candidate against a
//! pluggable set of severity-typed gates, deterministically selects the best
//! passing candidate per node, and records full decision provenance.

pub mod config;
pub mod controller;
pub mod credential;
pub mod domain;
pub mod faults;
pub mod gate;
pub mod generator;
pub mod judge;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod policy_resolver;
pub mod provenance;
pub mod reporting;
pub mod selector;
pub mod telemetry;

pub use domain::{
    worse_of, AttemptRecord, AttemptStatus, CandidateResult, ConfigError, DasError, EvalContext,
    GateInstance, GateResult, Mode, NodeDecision, OnHardFail, Policy, PolicyPartial, Result,
    RunSelection, SelectedRef, Severity, UnknownGatePolicy,
};

pub use config::{load_policy_config, PolicyConfig};
pub use controller::{AttemptController, NodeOutcome};
pub use credential::{
    call_with_refresh, AuthenticatedGenerator, AuthenticatedJudge, CredentialError,
    CredentialProvider,
};
pub use faults::{FaultInjector, ForcedFailures, NoFaults};
pub use gate::builtin::{
    BoundsGate, ContentSafetyGate, GoldenRegressionGate, PiiGate, PolicyPack, PolicyPacks,
    StructuralGate,
};
pub use gate::{
    evaluate_candidate, BlockAction, BoundGates, Evaluation, Gate, GateError, GateParams,
    GateRegistry, ModeActionTable, ModeActions,
};
pub use generator::{Generator, GeneratorError, NodeInput};
pub use judge::{Judge, JudgeConfig, JudgeError, JudgeRequest, Rubric, ScorecardCache};
pub use orchestrator::{Orchestrator, PipelineNode, RunReport, RunRequest};
pub use policy_resolver::resolve_policy;
pub use provenance::{
    load_decisions, load_selection, CandidateArtifact, DecisionLog, DecisionRecorder,
    MemoryRecorder, ProvenanceLogger,
};
pub use reporting::{render_run_summary_md, write_run_summary_md};

pub use das_store::{FsScorecardStore, MemoryScorecardStore, Scorecard, ScorecardStore};

pub use metrics::{MetricsSnapshot, METRICS};
pub use obs::RunSpan;
pub use telemetry::{init_tracing, init_tracing_from_env};

/// DAS version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
