//! Evaluation context passed to every gate invocation.

use serde::{Deserialize, Serialize};

/// Generation mode. `Seed` is offline authoring, `User` is interactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Seed,
    User,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seed => f.write_str("seed"),
            Self::User => f.write_str("user"),
        }
    }
}

/// Read-only context for one gate invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalContext {
    pub run_id: String,
    pub node_id: String,
    pub run_type: String,
    pub attempt: u32,
    pub candidate: u32,
    pub mode: Mode,
    /// Opaque persona/profile, if the run has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<serde_json::Value>,
}

impl EvalContext {
    /// Copy of this context pointed at a specific attempt/candidate slot.
    pub fn for_candidate(&self, attempt: u32, candidate: u32) -> Self {
        Self {
            attempt,
            candidate,
            ..self.clone()
        }
    }
}
