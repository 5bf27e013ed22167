//! External judge seam.
//!
//! The judge is an external model reached over a request/response call that
//! may fail, time out, or return malformed output. This module defines the
//! request shape, the [`Judge`] trait, and strict parsing of judge output:
//! the criterion ids in a response must exactly match the requested set.

pub mod cache;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::credential::{AuthFailure, CredentialError};
use crate::domain::digest::compute_digest;

pub use cache::ScorecardCache;

/// Which judge, and which prompt revision, scores a rubric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeConfig {
    pub model: String,
    pub prompt_version: String,
}

impl JudgeConfig {
    pub fn new(model: impl Into<String>, prompt_version: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt_version: prompt_version.into(),
        }
    }
}

/// One scored rubric criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Largest allowed drop versus the golden score.
    #[serde(default)]
    pub max_drop: f64,
}

/// A versioned list of criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub id: String,
    pub version: String,
    pub criteria: Vec<Criterion>,
}

impl Rubric {
    pub fn criterion_ids(&self) -> Vec<&str> {
        self.criteria.iter().map(|c| c.id.as_str()).collect()
    }

    /// Identity used in scorecard keys: `id@version#<digest of criteria>`.
    ///
    /// Editing a criterion without bumping the version still changes it.
    pub fn identity(&self) -> String {
        let criteria: Vec<Value> = self
            .criteria
            .iter()
            .map(|c| serde_json::json!({"id": c.id, "description": c.description}))
            .collect();
        let digest = compute_digest(&Value::Array(criteria))
            .map(|d| d.short().to_string())
            .unwrap_or_default();
        format!("{}@{}#{}", self.id, self.version, digest)
    }
}

/// Criterion sent to the judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeCriterion {
    pub id: String,
    pub description: String,
}

/// A single judge call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeRequest {
    pub config: JudgeConfig,
    /// Rubric or policy-pack identity.
    pub rubric: String,
    pub criteria: Vec<JudgeCriterion>,
    pub content: Value,
}

impl JudgeRequest {
    pub fn for_rubric(config: &JudgeConfig, rubric: &Rubric, content: &Value) -> Self {
        Self {
            config: config.clone(),
            rubric: rubric.identity(),
            criteria: rubric
                .criteria
                .iter()
                .map(|c| JudgeCriterion {
                    id: c.id.clone(),
                    description: c.description.clone(),
                })
                .collect(),
            content: content.clone(),
        }
    }
}

/// Judge failures. All of them surface as gate failures, never as passes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JudgeError {
    #[error("judge unavailable: {0}")]
    Unavailable(String),

    #[error("judge credential missing: {0}")]
    MissingCredential(String),

    #[error("judge rejected credential")]
    Unauthorized,

    #[error("judge transport error: {0}")]
    Transport(String),

    #[error("judge response schema mismatch: {0}")]
    Schema(String),

    #[error("judge criterion set mismatch (missing {missing:?}, extra {extra:?}, duplicate {duplicate:?})")]
    CriterionMismatch {
        missing: Vec<String>,
        extra: Vec<String>,
        duplicate: Vec<String>,
    },

    #[error("fixture cannot be hashed: {0}")]
    InvalidFixture(String),
}

impl JudgeError {
    /// Short reason code recorded in gate results.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "judge_unavailable",
            Self::MissingCredential(_) => "judge_credential_missing",
            Self::Unauthorized => "judge_unauthorized",
            Self::Transport(_) => "judge_transport_error",
            Self::Schema(_) => "judge_schema_mismatch",
            Self::CriterionMismatch { .. } => "judge_criterion_mismatch",
            Self::InvalidFixture(_) => "invalid_fixture",
        }
    }

    /// Missing dependency (vs. a judge that ran and misbehaved).
    pub fn is_missing_dependency(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::MissingCredential(_))
    }
}

impl AuthFailure for JudgeError {
    fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    fn from_credential(err: CredentialError) -> Self {
        Self::MissingCredential(err.to_string())
    }
}

/// External judge.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Raw judge output; parse with [`parse_scores`] or a gate-specific parser.
    async fn judge(&self, request: &JudgeRequest) -> Result<Value, JudgeError>;
}

/// Parsed rubric scores.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeScores {
    pub scores: BTreeMap<String, f64>,
    pub overall: f64,
}

/// The `criteria` array of a judge response, each entry an object with `id`.
pub fn response_criteria<'a>(raw: &'a Value) -> Result<&'a Vec<Value>, JudgeError> {
    raw.get("criteria")
        .and_then(Value::as_array)
        .ok_or_else(|| JudgeError::Schema("missing `criteria` array".to_string()))
}

/// Require `found` to equal `expected` as a set, with no repeats.
pub fn check_criterion_set(found: &[&str], expected: &[&str]) -> Result<(), JudgeError> {
    let expected_set: BTreeSet<&str> = expected.iter().copied().collect();
    let mut seen = BTreeSet::new();
    let mut duplicate = BTreeSet::new();
    for id in found {
        if !seen.insert(*id) {
            duplicate.insert(id.to_string());
        }
    }
    let missing: Vec<String> = expected_set
        .difference(&seen)
        .map(|s| s.to_string())
        .collect();
    let extra: Vec<String> = seen
        .difference(&expected_set)
        .map(|s| s.to_string())
        .collect();

    if missing.is_empty() && extra.is_empty() && duplicate.is_empty() {
        Ok(())
    } else {
        Err(JudgeError::CriterionMismatch {
            missing,
            extra,
            duplicate: duplicate.into_iter().collect(),
        })
    }
}

/// Parse `{"criteria": [{"id", "score"}...], "overall": f}`.
///
/// When `overall` is absent it is the mean of the criterion scores.
pub fn parse_scores(raw: &Value, expected: &[&str]) -> Result<JudgeScores, JudgeError> {
    let entries = response_criteria(raw)?;
    let mut ids = Vec::with_capacity(entries.len());
    let mut scores = BTreeMap::new();
    for entry in entries {
        let id = entry
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| JudgeError::Schema("criterion without string `id`".to_string()))?;
        let score = entry
            .get("score")
            .and_then(Value::as_f64)
            .ok_or_else(|| JudgeError::Schema(format!("criterion {id} without numeric `score`")))?;
        ids.push(id);
        scores.insert(id.to_string(), score);
    }
    check_criterion_set(&ids, expected)?;

    let overall = match raw.get("overall") {
        Some(v) => v
            .as_f64()
            .ok_or_else(|| JudgeError::Schema("`overall` is not a number".to_string()))?,
        None if scores.is_empty() => 0.0,
        None => scores.values().sum::<f64>() / scores.len() as f64,
    };
    Ok(JudgeScores { scores, overall })
}
