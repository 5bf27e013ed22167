//! `bounds`: text length and numeric range checks.
//!
//! Each configured check counts once. The score is the fraction of checks
//! that pass, and the gate passes when that fraction reaches `min_fraction`
//! (all checks by default). A range pointer that is absent or not a number
//! fails its check.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::{ConfigError, EvalContext, GateResult, Severity};
use crate::gate::text::flatten_text;
use crate::gate::{parse_typed, Gate, GateError, GateParams};

pub const GATE_ID: &str = "bounds";

/// Numeric range for the value at `pointer`. Both ends inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RangeCheck {
    pub pointer: String,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoundsParams {
    /// Bounds on the character count of the flattened artifact text.
    #[serde(default)]
    pub min_chars: Option<usize>,
    #[serde(default)]
    pub max_chars: Option<usize>,
    #[serde(default)]
    pub ranges: Vec<RangeCheck>,
    #[serde(default = "default_min_fraction")]
    pub min_fraction: f64,
}

fn default_min_fraction() -> f64 {
    1.0
}

pub struct BoundsGate;

impl BoundsGate {
    fn check(params: &BoundsParams, artifact: &Value) -> GateResult {
        let mut total = 0u32;
        let mut failed = Vec::new();

        if params.min_chars.is_some() || params.max_chars.is_some() {
            total += 1;
            let chars = flatten_text(artifact).chars().count();
            let too_short = params.min_chars.is_some_and(|min| chars < min);
            let too_long = params.max_chars.is_some_and(|max| chars > max);
            if too_short || too_long {
                failed.push(json!({ "check": "chars", "value": chars }));
            }
        }

        for range in &params.ranges {
            total += 1;
            let value = artifact.pointer(&range.pointer).and_then(Value::as_f64);
            let in_range = value.is_some_and(|v| {
                range.min.map_or(true, |min| v >= min) && range.max.map_or(true, |max| v <= max)
            });
            if !in_range {
                failed.push(json!({ "check": range.pointer, "value": value }));
            }
        }

        if total == 0 {
            return GateResult::pass(GATE_ID, 1.0);
        }
        let score = f64::from(total - failed.len() as u32) / f64::from(total);
        if score >= params.min_fraction {
            let result = GateResult::pass(GATE_ID, score);
            if failed.is_empty() {
                result
            } else {
                result.with_data(json!({ "failed": failed }))
            }
        } else {
            GateResult::fail(GATE_ID, Severity::HardFail, "out_of_bounds")
                .with_score(score)
                .with_data(json!({ "failed": failed, "checks": total }))
        }
    }
}

#[async_trait]
impl Gate for BoundsGate {
    fn id(&self) -> &str {
        GATE_ID
    }

    fn parse_params(&self, raw: Option<&Value>) -> Result<GateParams, ConfigError> {
        let params: BoundsParams = parse_typed(GATE_ID, raw)?;
        let invalid = |reason: String| ConfigError::InvalidGateParams {
            gate_id: GATE_ID.to_string(),
            reason,
        };
        if !(0.0..=1.0).contains(&params.min_fraction) {
            return Err(invalid(format!(
                "min_fraction {} outside [0, 1]",
                params.min_fraction
            )));
        }
        if let (Some(min), Some(max)) = (params.min_chars, params.max_chars) {
            if min > max {
                return Err(invalid(format!("min_chars {min} > max_chars {max}")));
            }
        }
        for range in &params.ranges {
            if let (Some(min), Some(max)) = (range.min, range.max) {
                if min > max {
                    return Err(invalid(format!("range {} has min > max", range.pointer)));
                }
            }
        }
        Ok(GateParams::Bounds(params))
    }

    async fn run(
        &self,
        artifact: &Value,
        params: &GateParams,
        _ctx: &EvalContext,
    ) -> Result<GateResult, GateError> {
        match params {
            GateParams::Bounds(p) => Ok(Self::check(p, artifact)),
            _ => Err(GateParams::mismatch(GATE_ID)),
        }
    }
}
