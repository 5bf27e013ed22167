//! Scheduling policy: partial documents as configured, and the resolved form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::severity::Severity;

/// What the run does when a node ends without a winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnHardFail {
    #[default]
    StopRun,
    Continue,
}

/// How a gate id with no registered implementation is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownGatePolicy {
    /// Synthesize a blocking `not_implemented` result.
    #[default]
    HardFail,
    /// Synthesize a non-blocking `not_implemented` result.
    Warn,
    /// Record an `info` skip.
    Skip,
}

/// Reference to a registered gate plus per-use configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateInstance {
    pub gate_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// Replaces the severity of a non-ok result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_override: Option<Severity>,
    /// Multiplier for this gate's score in the aggregate (default 1.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_weight: Option<f64>,
    /// Extra invocations allowed when the gate reports a transient error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_budget: Option<u32>,
}

impl GateInstance {
    pub fn new(gate_id: impl Into<String>) -> Self {
        Self {
            gate_id: gate_id.into(),
            params: None,
            severity_override: None,
            score_weight: None,
            retry_budget: None,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_severity_override(mut self, severity: Severity) -> Self {
        self.severity_override = Some(severity);
        self
    }

    pub fn with_score_weight(mut self, weight: f64) -> Self {
        self.score_weight = Some(weight);
        self
    }

    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = Some(budget);
        self
    }

    pub fn weight(&self) -> f64 {
        self.score_weight.unwrap_or(1.0)
    }

    pub fn retries(&self) -> u32 {
        self.retry_budget.unwrap_or(0)
    }
}

/// A policy as written in config: every field optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PolicyPartial {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(
        default,
        alias = "candidatesPerAttempt",
        skip_serializing_if = "Option::is_none"
    )]
    pub candidates_per_attempt: Option<i64>,
    #[serde(default, alias = "maxAttempts", skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gates: Option<Vec<GateInstance>>,
    #[serde(default, alias = "onHardFail", skip_serializing_if = "Option::is_none")]
    pub on_hard_fail: Option<OnHardFail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, serde_json::Value>>,
}

impl PolicyPartial {
    pub fn with_candidates(mut self, k: i64) -> Self {
        self.candidates_per_attempt = Some(k);
        self
    }

    pub fn with_max_attempts(mut self, m: i64) -> Self {
        self.max_attempts = Some(m);
        self
    }

    pub fn with_gates(mut self, gates: Vec<GateInstance>) -> Self {
        self.gates = Some(gates);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn with_on_hard_fail(mut self, on_hard_fail: OnHardFail) -> Self {
        self.on_hard_fail = Some(on_hard_fail);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }
}

/// Fully-populated policy for one node. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub enabled: bool,
    pub candidates_per_attempt: u32,
    pub max_attempts: u32,
    pub gates: Vec<GateInstance>,
    pub on_hard_fail: OnHardFail,
    pub params: BTreeMap<String, serde_json::Value>,
}

impl Policy {
    /// Number of generator calls the node makes if nothing passes, or `None`
    /// when it does not fit in a `u32`.
    pub fn generation_budget(&self) -> Option<u32> {
        self.candidates_per_attempt.checked_mul(self.max_attempts)
    }

    /// Template offset for a 1-based attempt/candidate pair. Resolved
    /// policies keep every offset below [`generation_budget`](Self::generation_budget).
    pub fn template_offset(&self, attempt: u32, candidate: u32) -> u32 {
        (attempt - 1) * self.candidates_per_attempt + (candidate - 1)
    }
}
