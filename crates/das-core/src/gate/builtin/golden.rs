//! `golden_regression`: judge-scored comparison against a golden fixture.
//!
//! The golden fixture is scored through the [`ScorecardCache`]; the
//! candidate is always scored fresh. The gate fails when any criterion drops
//! by more than its `max_drop`, or when the candidate's overall score is
//! below `min_overall`. Judge problems resolve through the mode action
//! table and never pass silently.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::{bounded_detail, ConfigError, EvalContext, GateResult};
use crate::gate::mode::{Condition, ModeActionTable};
use crate::gate::{parse_typed, Gate, GateError, GateParams};
use crate::judge::{Judge, JudgeConfig, JudgeError, Rubric, ScorecardCache};

pub const GATE_ID: &str = "golden_regression";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoldenParams {
    /// Name of a fixture registered with the gate.
    pub fixture: String,
    pub rubric: Rubric,
    pub judge: JudgeConfig,
    #[serde(default)]
    pub min_overall: Option<f64>,
    #[serde(default)]
    pub actions: ModeActionTable,
}

pub struct GoldenRegressionGate {
    judge: Option<Arc<dyn Judge>>,
    cache: Arc<ScorecardCache>,
    fixtures: BTreeMap<String, Value>,
}

impl GoldenRegressionGate {
    pub fn new(cache: Arc<ScorecardCache>) -> Self {
        Self {
            judge: None,
            cache,
            fixtures: BTreeMap::new(),
        }
    }

    pub fn with_judge(mut self, judge: Arc<dyn Judge>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn with_fixture(mut self, name: impl Into<String>, fixture: Value) -> Self {
        self.fixtures.insert(name.into(), fixture);
        self
    }

    fn judge_failure(params: &GoldenParams, ctx: &EvalContext, err: &JudgeError) -> GateResult {
        let condition = if err.is_missing_dependency() {
            Condition::MissingDependency
        } else {
            Condition::EvaluatorError
        };
        params
            .actions
            .resolve(GATE_ID, ctx, condition, err.reason_code())
            .with_data(json!({ "error": bounded_detail(&err.to_string()) }))
    }
}

#[async_trait]
impl Gate for GoldenRegressionGate {
    fn id(&self) -> &str {
        GATE_ID
    }

    fn parse_params(&self, raw: Option<&Value>) -> Result<GateParams, ConfigError> {
        let params: GoldenParams = parse_typed(GATE_ID, raw)?;
        let invalid = |reason: String| ConfigError::InvalidGateParams {
            gate_id: GATE_ID.to_string(),
            reason,
        };
        if !self.fixtures.contains_key(&params.fixture) {
            return Err(invalid(format!("unknown fixture `{}`", params.fixture)));
        }
        if params.rubric.criteria.is_empty() {
            return Err(invalid("rubric has no criteria".to_string()));
        }
        for criterion in &params.rubric.criteria {
            if !criterion.max_drop.is_finite() || criterion.max_drop < 0.0 {
                return Err(invalid(format!(
                    "criterion {} has invalid max_drop {}",
                    criterion.id, criterion.max_drop
                )));
            }
        }
        Ok(GateParams::GoldenRegression(params))
    }

    async fn run(
        &self,
        artifact: &Value,
        params: &GateParams,
        ctx: &EvalContext,
    ) -> Result<GateResult, GateError> {
        let GateParams::GoldenRegression(params) = params else {
            return Err(GateParams::mismatch(GATE_ID));
        };
        let Some(judge) = self.judge.as_deref() else {
            return Ok(params.actions.resolve(
                GATE_ID,
                ctx,
                Condition::MissingDependency,
                "judge_missing",
            ));
        };
        let fixture = self
            .fixtures
            .get(&params.fixture)
            .ok_or_else(|| GateError::fatal("fixture_missing", params.fixture.clone()))?;

        let (golden, cache_hit) = match self
            .cache
            .golden_scorecard(judge, &params.judge, &params.rubric, fixture)
            .await
        {
            Ok(found) => found,
            Err(err) => return Ok(Self::judge_failure(params, ctx, &err)),
        };
        let candidate = match self
            .cache
            .score_fresh(judge, &params.judge, &params.rubric, artifact)
            .await
        {
            Ok(scores) => scores,
            Err(err) => return Ok(Self::judge_failure(params, ctx, &err)),
        };

        let mut regressions = Vec::new();
        for criterion in &params.rubric.criteria {
            let before = golden.scores.get(&criterion.id).copied().unwrap_or(0.0);
            let after = candidate.scores.get(&criterion.id).copied().unwrap_or(0.0);
            let drop = before - after;
            if drop > criterion.max_drop {
                regressions.push(json!({
                    "criterion": criterion.id,
                    "golden": before,
                    "candidate": after,
                    "max_drop": criterion.max_drop,
                }));
            }
        }
        let below_min = params
            .min_overall
            .is_some_and(|min| candidate.overall < min);

        let data = json!({
            "fixture": params.fixture,
            "golden_overall": golden.overall,
            "overall": candidate.overall,
            "cache_hit": cache_hit,
            "regressions": regressions,
            "below_min_overall": below_min,
        });
        let result = if regressions.is_empty() && !below_min {
            GateResult::pass(GATE_ID, candidate.overall)
        } else {
            params
                .actions
                .resolve(GATE_ID, ctx, Condition::Violation, "regression")
                .with_score(candidate.overall)
        };
        Ok(result.with_data(data))
    }
}
