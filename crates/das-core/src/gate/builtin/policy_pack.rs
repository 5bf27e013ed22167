//! Versioned policy packs shared by the `content_safety` and `pii` gates.
//!
//! A pack is a list of criteria, each either a regex over the candidate's
//! flattened text or a judge-scored description, tagged with a [`Risk`].
//! Evaluation collects the worst detected risk and maps it, together with
//! any judge dependency problems, through the mode action table.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::{bounded_detail, worse_of, ConfigError, EvalContext, GateResult, Severity};
use crate::gate::mode::{Condition, ModeActionTable};
use crate::gate::parse_typed;
use crate::gate::text::flatten_text;
use crate::judge::{
    check_criterion_set, response_criteria, Judge, JudgeConfig, JudgeCriterion, JudgeError,
    JudgeRequest,
};

/// Risk attached to a criterion. Ordered `none < low < medium < high`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Risk {
    #[default]
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CriterionCheck {
    Regex { pattern: String },
    Judge { description: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyCriterion {
    pub id: String,
    #[serde(flatten)]
    pub check: CriterionCheck,
    pub risk: Risk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyPack {
    pub id: String,
    pub version: String,
    pub criteria: Vec<PolicyCriterion>,
}

impl PolicyPack {
    pub fn key(&self) -> String {
        pack_key(&self.id, &self.version)
    }

    pub fn has_judge_criteria(&self) -> bool {
        self.criteria
            .iter()
            .any(|c| matches!(c.check, CriterionCheck::Judge { .. }))
    }
}

fn pack_key(id: &str, version: &str) -> String {
    format!("{id}@{version}")
}

/// Pack lookup and validation failures. Raised while binding a node.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PackError {
    #[error("policy_pack_missing: {0}")]
    Missing(String),

    #[error("policy_pack_malformed: {0}")]
    Malformed(String),
}

impl PackError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Missing(_) => "policy_pack_missing",
            Self::Malformed(_) => "policy_pack_malformed",
        }
    }

    /// Bind-time error for the gate that referenced the pack.
    pub fn into_config_error(self, gate_id: &str) -> ConfigError {
        ConfigError::InvalidGateParams {
            gate_id: gate_id.to_string(),
            reason: self.to_string(),
        }
    }
}

/// Raw pack documents keyed by `id@version`.
///
/// Packs are kept unparsed until a node binds a gate that references them,
/// so a malformed document fails that node's configuration, not construction.
#[derive(Debug, Clone, Default)]
pub struct PolicyPacks {
    raw: BTreeMap<String, Value>,
}

impl PolicyPacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_raw(&mut self, id: &str, version: &str, document: Value) {
        self.raw.insert(pack_key(id, version), document);
    }

    pub fn with_pack(mut self, pack: &PolicyPack) -> Self {
        let document = serde_json::to_value(pack).unwrap_or(Value::Null);
        self.raw.insert(pack.key(), document);
        self
    }

    /// Parse and compile a pack.
    pub fn load(&self, id: &str, version: &str) -> Result<CompiledPack, PackError> {
        let key = pack_key(id, version);
        let document = self
            .raw
            .get(&key)
            .ok_or_else(|| PackError::Missing(key.clone()))?;
        let pack: PolicyPack = serde_json::from_value(document.clone())
            .map_err(|e| PackError::Malformed(format!("{key}: {e}")))?;
        CompiledPack::compile(pack)
    }
}

/// A validated pack with its regexes compiled.
#[derive(Debug, Clone)]
pub struct CompiledPack {
    pub pack: PolicyPack,
    regexes: Vec<Option<Regex>>,
}

/// Regexes are derived from the pack, so the pack alone decides equality.
impl PartialEq for CompiledPack {
    fn eq(&self, other: &Self) -> bool {
        self.pack == other.pack
    }
}

impl CompiledPack {
    fn compile(pack: PolicyPack) -> Result<Self, PackError> {
        if pack.criteria.is_empty() {
            return Err(PackError::Malformed(format!("{} has no criteria", pack.key())));
        }
        let mut seen = BTreeSet::new();
        let mut regexes = Vec::with_capacity(pack.criteria.len());
        for criterion in &pack.criteria {
            if !seen.insert(criterion.id.as_str()) {
                return Err(PackError::Malformed(format!(
                    "duplicate criterion {}",
                    criterion.id
                )));
            }
            regexes.push(match &criterion.check {
                CriterionCheck::Regex { pattern } => {
                    Some(Regex::new(pattern).map_err(|e| {
                        PackError::Malformed(format!("criterion {}: {e}", criterion.id))
                    })?)
                }
                CriterionCheck::Judge { .. } => None,
            });
        }
        Ok(Self { pack, regexes })
    }

    fn judge_criteria(&self) -> Vec<JudgeCriterion> {
        self.pack
            .criteria
            .iter()
            .filter_map(|c| match &c.check {
                CriterionCheck::Judge { description } => Some(JudgeCriterion {
                    id: c.id.clone(),
                    description: description.clone(),
                }),
                CriterionCheck::Regex { .. } => None,
            })
            .collect()
    }
}

/// Params for policy-pack gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyGateParams {
    pub pack: String,
    pub version: String,
    /// Lowest risk that counts as a violation; lower non-zero risk warns.
    #[serde(default = "default_block_at")]
    pub block_at: Risk,
    #[serde(default)]
    pub actions: ModeActionTable,
    /// Required when the pack has judge-scored criteria.
    #[serde(default)]
    pub judge: Option<JudgeConfig>,
}

fn default_block_at() -> Risk {
    Risk::Medium
}

/// Params plus the pack they reference, compiled once at bind time.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundPolicyParams {
    pub params: PolicyGateParams,
    pub pack: Arc<CompiledPack>,
}

impl BoundPolicyParams {
    /// Parse raw params and resolve the referenced pack from `packs`.
    pub fn bind(
        gate_id: &str,
        packs: &PolicyPacks,
        raw: Option<&Value>,
    ) -> Result<Self, ConfigError> {
        let params: PolicyGateParams = parse_typed(gate_id, raw)?;
        let pack = packs
            .load(&params.pack, &params.version)
            .map_err(|e| e.into_config_error(gate_id))?;
        Ok(Self {
            params,
            pack: Arc::new(pack),
        })
    }
}

/// Evaluate `artifact` against a compiled pack.
pub async fn evaluate_pack(
    gate_id: &str,
    pack: &CompiledPack,
    params: &PolicyGateParams,
    judge: Option<&dyn Judge>,
    artifact: &Value,
    ctx: &EvalContext,
) -> GateResult {
    let text = flatten_text(artifact);
    let mut hits: BTreeMap<String, Risk> = BTreeMap::new();
    for (criterion, regex) in pack.pack.criteria.iter().zip(&pack.regexes) {
        if let Some(regex) = regex {
            if regex.is_match(&text) {
                hits.insert(criterion.id.clone(), criterion.risk);
            }
        }
    }

    let mut issues = Vec::new();
    let judge_criteria = pack.judge_criteria();
    if !judge_criteria.is_empty() {
        match (judge, &params.judge) {
            (None, _) => issues.push(params.actions.resolve(
                gate_id,
                ctx,
                Condition::MissingDependency,
                "judge_missing",
            )),
            (Some(_), None) => issues.push(params.actions.resolve(
                gate_id,
                ctx,
                Condition::MissingDependency,
                "judge_config_missing",
            )),
            (Some(judge), Some(config)) => {
                let request = JudgeRequest {
                    config: config.clone(),
                    rubric: pack.pack.key(),
                    criteria: judge_criteria,
                    content: artifact.clone(),
                };
                let flagged = match judge.judge(&request).await {
                    Ok(raw) => parse_flags(&raw, &request.criteria),
                    Err(err) => Err(err),
                };
                match flagged {
                    Ok(flagged) => {
                        for criterion in &pack.pack.criteria {
                            if flagged.contains(criterion.id.as_str()) {
                                hits.insert(criterion.id.clone(), criterion.risk);
                            }
                        }
                    }
                    Err(err) => {
                        let condition = if err.is_missing_dependency() {
                            Condition::MissingDependency
                        } else {
                            Condition::EvaluatorError
                        };
                        issues.push(
                            params
                                .actions
                                .resolve(gate_id, ctx, condition, err.reason_code())
                                .with_data(json!({ "error": bounded_detail(&err.to_string()) })),
                        );
                    }
                }
            }
        }
    }

    let worst = hits.values().copied().max().unwrap_or(Risk::None);
    if worst >= params.block_at && worst > Risk::None {
        issues.push(
            params
                .actions
                .resolve(gate_id, ctx, Condition::Violation, "policy_violation"),
        );
    } else if worst > Risk::None {
        issues.push(GateResult::fail(gate_id, Severity::Warn, "policy_risk"));
    }

    // Only criterion ids are recorded; matched text never leaves the gate.
    let data = json!({
        "pack": pack.pack.key(),
        "worst_risk": worst,
        "hits": hits,
    });
    merge(gate_id, issues).with_data(data)
}

/// Fold sub-outcomes into one result: the worst non-ok issue wins.
fn merge(gate_id: &str, issues: Vec<GateResult>) -> GateResult {
    issues
        .into_iter()
        .reduce(|kept, next| if outranks(&next, &kept) { next } else { kept })
        .unwrap_or_else(|| GateResult::pass(gate_id, 1.0))
}

fn outranks(next: &GateResult, kept: &GateResult) -> bool {
    match (kept.ok, next.ok) {
        (true, false) => true,
        (false, true) => false,
        _ => worse_of(kept.severity, next.severity) != kept.severity,
    }
}

/// Parse `{"criteria": [{"id", "flagged": bool}]}` into the flagged ids.
fn parse_flags(raw: &Value, expected: &[JudgeCriterion]) -> Result<BTreeSet<String>, JudgeError> {
    let entries = response_criteria(raw)?;
    let mut ids = Vec::with_capacity(entries.len());
    let mut flagged = BTreeSet::new();
    for entry in entries {
        let id = entry
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| JudgeError::Schema("criterion without string `id`".to_string()))?;
        let flag = entry
            .get("flagged")
            .and_then(Value::as_bool)
            .ok_or_else(|| JudgeError::Schema(format!("criterion {id} without boolean `flagged`")))?;
        ids.push(id);
        if flag {
            flagged.insert(id.to_string());
        }
    }
    let expected_ids: Vec<&str> = expected.iter().map(|c| c.id.as_str()).collect();
    check_criterion_set(&ids, &expected_ids)?;
    Ok(flagged)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::Mode;
    use crate::gate::mode::{BlockAction, ModeActions};
    use async_trait::async_trait;

    pub(crate) fn ctx(mode: Mode) -> EvalContext {
        EvalContext {
            run_id: "r".into(),
            node_id: "n".into(),
            run_type: "test".into(),
            attempt: 1,
            candidate: 1,
            mode,
            persona: None,
        }
    }

    pub(crate) fn safety_pack() -> PolicyPack {
        PolicyPack {
            id: "safety".into(),
            version: "2".into(),
            criteria: vec![
                PolicyCriterion {
                    id: "medical_claim".into(),
                    check: CriterionCheck::Regex {
                        pattern: r"(?i)\bcures?\b".into(),
                    },
                    risk: Risk::High,
                },
                PolicyCriterion {
                    id: "hype".into(),
                    check: CriterionCheck::Regex {
                        pattern: r"(?i)miracle".into(),
                    },
                    risk: Risk::Low,
                },
                PolicyCriterion {
                    id: "harmful_advice".into(),
                    check: CriterionCheck::Judge {
                        description: "advice that could cause harm".into(),
                    },
                    risk: Risk::High,
                },
            ],
        }
    }

    fn params() -> PolicyGateParams {
        PolicyGateParams {
            pack: "safety".into(),
            version: "2".into(),
            block_at: Risk::Medium,
            actions: ModeActionTable {
                seed: ModeActions::default(),
                user: ModeActions {
                    on_missing_dependency: BlockAction::Warn,
                    ..ModeActions::default()
                },
            },
            judge: Some(JudgeConfig::new("judge-1", "p1")),
        }
    }

    struct Scripted(Result<Value, JudgeError>);

    #[async_trait]
    impl Judge for Scripted {
        async fn judge(&self, _request: &JudgeRequest) -> Result<Value, JudgeError> {
            self.0.clone()
        }
    }

    fn compiled() -> CompiledPack {
        PolicyPacks::new()
            .with_pack(&safety_pack())
            .load("safety", "2")
            .unwrap()
    }

    fn clean_judge() -> Scripted {
        Scripted(Ok(json!({"criteria": [{"id": "harmful_advice", "flagged": false}]})))
    }

    async fn eval(judge: Option<&Scripted>, text: &str, mode: Mode) -> GateResult {
        evaluate_pack(
            "content_safety",
            &compiled(),
            &params(),
            judge.map(|j| j as &dyn Judge),
            &json!({ "t": text }),
            &ctx(mode),
        )
        .await
    }

    #[tokio::test]
    async fn clean_text_passes() {
        let judge = clean_judge();
        let r = eval(Some(&judge), "gentle cleanser", Mode::Seed).await;
        assert!(r.ok, "{r:?}");
        assert_eq!(r.score, 1.0);
    }

    #[tokio::test]
    async fn high_risk_regex_blocks() {
        let judge = clean_judge();
        let r = eval(Some(&judge), "this cures acne", Mode::User).await;
        assert!(r.blocks());
        assert_eq!(r.reason, "policy_violation");
        assert_eq!(r.data.unwrap()["hits"]["medical_claim"], "high");
    }

    #[tokio::test]
    async fn low_risk_warns() {
        let judge = clean_judge();
        let r = eval(Some(&judge), "a miracle serum", Mode::Seed).await;
        assert!(!r.ok);
        assert!(!r.blocks());
        assert_eq!(r.reason, "policy_risk");
    }

    #[tokio::test]
    async fn judge_flag_counts_as_hit() {
        let judge = Scripted(Ok(json!({"criteria": [{"id": "harmful_advice", "flagged": true}]})));
        let r = eval(Some(&judge), "x", Mode::Seed).await;
        assert!(r.blocks());
    }

    #[tokio::test]
    async fn missing_judge_is_mode_dependent() {
        let seed = eval(None, "x", Mode::Seed).await;
        let user = eval(None, "x", Mode::User).await;
        assert!(seed.blocks());
        assert_eq!(seed.reason, "judge_missing");
        assert!(!user.blocks());
        assert_eq!(user.severity, Severity::Warn);
    }

    #[tokio::test]
    async fn criterion_mismatch_is_evaluator_error() {
        let judge = Scripted(Ok(json!({"criteria": [
            {"id": "harmful_advice", "flagged": false},
            {"id": "off_topic", "flagged": false}
        ]})));
        let r = eval(Some(&judge), "x", Mode::User).await;
        assert!(r.blocks(), "evaluator errors block in user mode by default");
        assert_eq!(r.reason, "judge_criterion_mismatch");
    }

    #[tokio::test]
    async fn violation_outranks_warn() {
        let r = eval(None, "miracle that cures", Mode::User).await;
        assert!(r.blocks());
        assert_eq!(r.reason, "policy_violation");
    }

    #[test]
    fn missing_and_malformed_packs_are_rejected() {
        let packs = PolicyPacks::new();
        let err = packs.load("safety", "9").unwrap_err();
        assert_eq!(err, PackError::Missing("safety@9".into()));
        assert_eq!(err.reason_code(), "policy_pack_missing");

        let mut packs = PolicyPacks::new();
        packs.insert_raw("bad", "1", json!({"id": "bad", "version": "1", "criteria": [
            {"id": "x", "kind": "regex", "pattern": "(", "risk": "high"}
        ]}));
        packs.insert_raw("dup", "1", json!({"id": "dup", "version": "1", "criteria": [
            {"id": "x", "kind": "regex", "pattern": "a", "risk": "high"},
            {"id": "x", "kind": "regex", "pattern": "b", "risk": "low"}
        ]}));
        packs.insert_raw("shape", "1", json!({"criteria": "none"}));
        for id in ["bad", "dup", "shape"] {
            let err = packs.load(id, "1").unwrap_err();
            assert_eq!(err.reason_code(), "policy_pack_malformed", "{id}");
        }
    }

    #[test]
    fn bind_compiles_pack_once() {
        let packs = PolicyPacks::new().with_pack(&safety_pack());
        let bound = BoundPolicyParams::bind(
            "content_safety",
            &packs,
            Some(&json!({"pack": "safety", "version": "2"})),
        )
        .unwrap();
        assert_eq!(bound.pack.pack, safety_pack());
        assert_eq!(bound.params.block_at, Risk::Medium);

        let err = BoundPolicyParams::bind(
            "content_safety",
            &packs,
            Some(&json!({"pack": "safety", "version": "3"})),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidGateParams { ref reason, .. } if reason.starts_with("policy_pack_missing")
        ));
    }

    #[test]
    fn risk_is_ordered() {
        assert!(Risk::None < Risk::Low);
        assert!(Risk::Medium < Risk::High);
    }
}
