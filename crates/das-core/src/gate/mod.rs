//! Gate contract, registry, and evaluator.
//!
//! A [`Gate`] scores one candidate artifact and returns a severity-tagged
//! [`GateResult`]. Gates are looked up by id in a [`GateRegistry`]; the
//! registry binds a node's policy into [`BoundGates`] once, validating every
//! gate's parameters into a typed [`GateParams`] before any generation runs.

pub mod builtin;
pub mod evaluator;
pub mod mode;
pub mod registry;
pub mod text;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::domain::{ConfigError, EvalContext, GateResult};

pub use builtin::bounds::BoundsParams;
pub use builtin::golden::GoldenParams;
pub use builtin::policy_pack::{BoundPolicyParams, PolicyGateParams};
pub use builtin::structural::StructuralParams;
pub use evaluator::{evaluate_candidate, Evaluation};
pub use mode::{BlockAction, Condition, ModeActionTable, ModeActions};
pub use registry::{BoundGate, BoundGates, GateRegistry};

/// Errors a gate may raise instead of a result.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GateError {
    /// May succeed on re-invocation; consumes the instance's retry budget.
    #[error("transient gate error: {0}")]
    Transient(String),

    /// Cannot succeed on any candidate; ends the node.
    #[error("{reason}: {detail}")]
    Fatal { reason: String, detail: String },
}

impl GateError {
    pub fn fatal(reason: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
            detail: detail.into(),
        }
    }

    /// Reason recorded on the failing gate result.
    pub fn reason_code(&self) -> &str {
        match self {
            Self::Transient(_) => "evaluator_error",
            Self::Fatal { reason, .. } => reason,
        }
    }
}

/// Gate parameters, validated per gate id at bind time.
#[derive(Debug, Clone, PartialEq)]
pub enum GateParams {
    Structural(StructuralParams),
    Bounds(BoundsParams),
    ContentSafety(BoundPolicyParams),
    Pii(BoundPolicyParams),
    GoldenRegression(GoldenParams),
    /// Untyped params for gates outside the built-in set.
    Custom(serde_json::Value),
}

impl GateParams {
    /// The error a gate returns when handed another gate's params.
    pub fn mismatch(gate_id: &str) -> GateError {
        GateError::fatal("params_mismatch", format!("gate {gate_id} received foreign params"))
    }
}

/// A pluggable quality/safety check.
#[async_trait]
pub trait Gate: Send + Sync {
    /// Registry identifier.
    fn id(&self) -> &str;

    /// Validate raw config params. Called once per node at bind time.
    fn parse_params(
        &self,
        raw: Option<&serde_json::Value>,
    ) -> std::result::Result<GateParams, ConfigError> {
        Ok(GateParams::Custom(
            raw.cloned().unwrap_or(serde_json::Value::Null),
        ))
    }

    /// Evaluate one artifact.
    async fn run(
        &self,
        artifact: &serde_json::Value,
        params: &GateParams,
        ctx: &EvalContext,
    ) -> std::result::Result<GateResult, GateError>;
}

/// Deserialize `raw` (or `{}` when absent) into a typed params struct.
pub(crate) fn parse_typed<T: DeserializeOwned>(
    gate_id: &str,
    raw: Option<&serde_json::Value>,
) -> std::result::Result<T, ConfigError> {
    let value = raw
        .cloned()
        .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
    serde_json::from_value(value).map_err(|e| ConfigError::InvalidGateParams {
        gate_id: gate_id.to_string(),
        reason: e.to_string(),
    })
}
