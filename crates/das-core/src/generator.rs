//! External content generator seam.
//!
//! A generator is called once per candidate slot with a `template_offset`
//! that is unique within the node, so a deterministic-but-parameterized
//! generator can rotate templates instead of relying on randomness.
//! Errors mean the call itself failed; malformed-but-present output is
//! returned as `Ok` and left for the gates to catch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::credential::{AuthFailure, CredentialError};

/// Input handed to a node's generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInput {
    pub node_id: String,
    /// Node-specific seed material (template parameters, persona, etc.).
    pub seed: Value,
    /// Selected artifact of the previous node, if it produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_node: Option<String>,
}

impl NodeInput {
    pub fn new(node_id: impl Into<String>, seed: Value) -> Self {
        Self {
            node_id: node_id.into(),
            seed,
            upstream: None,
            upstream_node: None,
        }
    }

    pub fn with_upstream(mut self, node_id: impl Into<String>, artifact: Value) -> Self {
        self.upstream_node = Some(node_id.into());
        self.upstream = Some(artifact);
        self
    }
}

/// Generator call failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeneratorError {
    #[error("generation failed: {0}")]
    Failed(String),

    #[error("generation timed out after {0}ms")]
    Timeout(u64),

    #[error("generator rejected credential")]
    Unauthorized,

    #[error("generator credential missing: {0}")]
    MissingCredential(String),
}

impl GeneratorError {
    /// Short reason code recorded on the candidate.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Failed(_) => "generator_failed",
            Self::Timeout(_) => "generator_timeout",
            Self::Unauthorized => "generator_unauthorized",
            Self::MissingCredential(_) => "generator_credential_missing",
        }
    }
}

impl AuthFailure for GeneratorError {
    fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    fn from_credential(err: CredentialError) -> Self {
        Self::MissingCredential(err.to_string())
    }
}

/// Produces candidate artifacts for one node.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, input: &NodeInput, template_offset: u32)
        -> Result<Value, GeneratorError>;
}
