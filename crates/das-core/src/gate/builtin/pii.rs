//! `pii`: regex-only policy pack over the flattened candidate text.
//!
//! PII packs may not contain judge criteria; candidate text is never sent
//! to an external judge from this gate.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{ConfigError, EvalContext, GateResult};
use crate::gate::builtin::policy_pack::{evaluate_pack, BoundPolicyParams, PolicyPacks};
use crate::gate::{Gate, GateError, GateParams};

pub const GATE_ID: &str = "pii";

pub struct PiiGate {
    packs: Arc<PolicyPacks>,
}

impl PiiGate {
    pub fn new(packs: Arc<PolicyPacks>) -> Self {
        Self { packs }
    }
}

#[async_trait]
impl Gate for PiiGate {
    fn id(&self) -> &str {
        GATE_ID
    }

    fn parse_params(&self, raw: Option<&Value>) -> Result<GateParams, ConfigError> {
        let bound = BoundPolicyParams::bind(GATE_ID, &self.packs, raw)?;
        if bound.params.judge.is_some() {
            return Err(ConfigError::InvalidGateParams {
                gate_id: GATE_ID.to_string(),
                reason: "pii gate does not take a judge".to_string(),
            });
        }
        if bound.pack.pack.has_judge_criteria() {
            return Err(ConfigError::InvalidGateParams {
                gate_id: GATE_ID.to_string(),
                reason: format!(
                    "policy_pack_malformed: {} has judge criteria",
                    bound.pack.pack.key()
                ),
            });
        }
        Ok(GateParams::Pii(bound))
    }

    async fn run(
        &self,
        artifact: &Value,
        params: &GateParams,
        ctx: &EvalContext,
    ) -> Result<GateResult, GateError> {
        let GateParams::Pii(bound) = params else {
            return Err(GateParams::mismatch(GATE_ID));
        };
        Ok(evaluate_pack(GATE_ID, &bound.pack, &bound.params, None, artifact, ctx).await)
    }
}
