//! `structural`: required fields are present.
//!
//! Fields are addressed by JSON pointer (`/steps/0/name`). A pointer that
//! does not resolve, or resolves to `null`, is missing. Pointers listed in
//! `non_empty` must additionally hold a non-empty string, array or object.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::{ConfigError, EvalContext, GateResult, Severity};
use crate::gate::{parse_typed, Gate, GateError, GateParams};

pub const GATE_ID: &str = "structural";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructuralParams {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub non_empty: Vec<String>,
    /// Reject artifacts whose root is not a JSON object.
    #[serde(default = "default_true")]
    pub require_object: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StructuralParams {
    fn default() -> Self {
        Self {
            required: Vec::new(),
            non_empty: Vec::new(),
            require_object: true,
        }
    }
}

pub struct StructuralGate;

impl StructuralGate {
    fn check(params: &StructuralParams, artifact: &Value) -> GateResult {
        if params.require_object && !artifact.is_object() {
            return GateResult::fail(GATE_ID, Severity::HardFail, "not_an_object");
        }

        let missing: Vec<&str> = params
            .required
            .iter()
            .filter(|p| matches!(artifact.pointer(p), None | Some(Value::Null)))
            .map(String::as_str)
            .collect();
        let empty: Vec<&str> = params
            .non_empty
            .iter()
            .filter(|p| is_empty(artifact.pointer(p)))
            .map(String::as_str)
            .collect();

        if missing.is_empty() && empty.is_empty() {
            GateResult::pass(GATE_ID, 1.0)
        } else {
            GateResult::fail(GATE_ID, Severity::HardFail, "missing_fields")
                .with_data(json!({ "missing": missing, "empty": empty }))
        }
    }
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        Some(_) => false,
    }
}

#[async_trait]
impl Gate for StructuralGate {
    fn id(&self) -> &str {
        GATE_ID
    }

    fn parse_params(&self, raw: Option<&Value>) -> Result<GateParams, ConfigError> {
        let params: StructuralParams = parse_typed(GATE_ID, raw)?;
        for pointer in params.required.iter().chain(&params.non_empty) {
            if !pointer.is_empty() && !pointer.starts_with('/') {
                return Err(ConfigError::InvalidGateParams {
                    gate_id: GATE_ID.to_string(),
                    reason: format!("`{pointer}` is not a JSON pointer"),
                });
            }
        }
        Ok(GateParams::Structural(params))
    }

    async fn run(
        &self,
        artifact: &Value,
        params: &GateParams,
        _ctx: &EvalContext,
    ) -> Result<GateResult, GateError> {
        match params {
            GateParams::Structural(p) => Ok(Self::check(p, artifact)),
            _ => Err(GateParams::mismatch(GATE_ID)),
        }
    }
}
