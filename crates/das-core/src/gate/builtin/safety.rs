//! `content_safety`: regex and judge criteria from a policy pack.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{ConfigError, EvalContext, GateResult};
use crate::gate::builtin::policy_pack::{evaluate_pack, BoundPolicyParams, PolicyPacks};
use crate::gate::{Gate, GateError, GateParams};
use crate::judge::Judge;

pub const GATE_ID: &str = "content_safety";

pub struct ContentSafetyGate {
    packs: Arc<PolicyPacks>,
    judge: Option<Arc<dyn Judge>>,
}

impl ContentSafetyGate {
    pub fn new(packs: Arc<PolicyPacks>) -> Self {
        Self { packs, judge: None }
    }

    pub fn with_judge(mut self, judge: Arc<dyn Judge>) -> Self {
        self.judge = Some(judge);
        self
    }
}

#[async_trait]
impl Gate for ContentSafetyGate {
    fn id(&self) -> &str {
        GATE_ID
    }

    fn parse_params(&self, raw: Option<&Value>) -> Result<GateParams, ConfigError> {
        let bound = BoundPolicyParams::bind(GATE_ID, &self.packs, raw)?;
        Ok(GateParams::ContentSafety(bound))
    }

    async fn run(
        &self,
        artifact: &Value,
        params: &GateParams,
        ctx: &EvalContext,
    ) -> Result<GateResult, GateError> {
        let GateParams::ContentSafety(bound) = params else {
            return Err(GateParams::mismatch(GATE_ID));
        };
        Ok(evaluate_pack(
            GATE_ID,
            &bound.pack,
            &bound.params,
            self.judge.as_deref(),
            artifact,
            ctx,
        )
        .await)
    }
}
