//! Domain-level error taxonomy for DAS.

use crate::domain::decision::AttemptStatus;
use crate::orchestrator::RunReport;

/// Configuration errors. Raised before any generation work and never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("node {node}: candidates_per_attempt must be >= 1, got {value}")]
    InvalidCandidateCount { node: String, value: i64 },

    #[error("node {node}: max_attempts must be >= 1, got {value}")]
    InvalidAttemptCount { node: String, value: i64 },

    #[error("node {node}: {candidates} candidates x {attempts} attempts overflows the generation budget")]
    GenerationBudgetOverflow {
        node: String,
        candidates: u32,
        attempts: u32,
    },

    #[error("gate {gate_id}: score_weight must be a finite value >= 0, got {value}")]
    InvalidScoreWeight { gate_id: String, value: f64 },

    #[error("unsupported policy config version: {0}")]
    UnsupportedVersion(u32),

    #[error("invalid params for gate {gate_id}: {reason}")]
    InvalidGateParams { gate_id: String, reason: String },

    #[error("node {node} references unknown gate: {gate_id}")]
    UnknownGate { node: String, gate_id: String },

    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("config parse error: {0}")]
    Parse(String),
}

/// DAS domain errors.
#[derive(Debug, thiserror::Error)]
pub enum DasError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("run aborted at node {node_id}: {status}")]
    RunAborted {
        node_id: String,
        status: AttemptStatus,
        /// Everything the run produced up to and including the failing node.
        report: Box<RunReport>,
    },

    #[error("invalid decision record: {0}")]
    InvalidDecision(String),

    #[error("run id must be a single path segment: {0:?}")]
    InvalidRunId(String),

    #[error("non-canonical value: {0}")]
    NonCanonical(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] das_store::StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for DAS domain operations.
pub type Result<T> = std::result::Result<T, DasError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidCandidateCount {
            node: "routine".to_string(),
            value: 0,
        };
        assert!(err.to_string().contains("candidates_per_attempt"));
        assert!(err.to_string().contains("routine"));

        let err = ConfigError::UnknownGate {
            node: "routine".to_string(),
            gate_id: "nope".to_string(),
        };
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_run_aborted_display() {
        let err = DasError::RunAborted {
            node_id: "control".to_string(),
            status: AttemptStatus::Exhausted,
            report: Box::new(RunReport::new("run-1")),
        };
        let msg = err.to_string();
        assert!(msg.contains("control"));
        assert!(msg.contains("exhausted"));
    }

    #[test]
    fn test_config_error_converts() {
        let err: DasError = ConfigError::UnsupportedVersion(7).into();
        assert!(err.to_string().contains("configuration error"));
    }
}
