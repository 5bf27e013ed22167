//! Incremental, crash-safe decision provenance.
//!
//! Layout under `<root>/<run_id>/`:
//! - `decisions.json`: every node's [`NodeDecision`] (all attempts, all
//!   candidates, all gate results)
//! - `selection.json`: the compact [`RunSelection`] (winners only)
//! - `candidates/<node>/attempt-<a>-candidate-<c>.json`: raw generator
//!   input and output per candidate slot
//!
//! `run_id` must be a single plain path segment. Node ids outside
//! `[A-Za-z0-9_-]` are mapped to `<cleaned>.<hash>` so distinct ids never
//! share a directory.
//!
//! Both documents are rewritten after every recorded candidate through a
//! temp-file-and-rename, so a killed process leaves the previous complete
//! version on disk. `selection.json` is derived from the decisions and
//! written second; a selection never points at a candidate the decision
//! log does not contain.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::domain::{DasError, NodeDecision, Result, RunSelection};
use crate::generator::NodeInput;

pub const DECISIONS_FILE: &str = "decisions.json";
pub const SELECTION_FILE: &str = "selection.json";
pub const CANDIDATES_DIR: &str = "candidates";
pub const DECISION_LOG_SCHEMA_VERSION: u32 = 1;

/// Raw record of one generator call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateArtifact {
    pub run_id: String,
    pub node_id: String,
    pub attempt: u32,
    pub candidate: u32,
    pub template_offset: u32,
    pub input: NodeInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Persisted form of `decisions.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionLog {
    pub schema_version: u32,
    pub run_id: String,
    pub updated_at: DateTime<Utc>,
    /// In pipeline order.
    pub nodes: Vec<NodeDecision>,
}

impl DecisionLog {
    fn new(run_id: &str) -> Self {
        Self {
            schema_version: DECISION_LOG_SCHEMA_VERSION,
            run_id: run_id.to_string(),
            updated_at: Utc::now(),
            nodes: Vec::new(),
        }
    }

    pub fn node(&self, node_id: &str) -> Option<&NodeDecision> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    fn upsert(&mut self, decision: &NodeDecision) {
        match self.nodes.iter_mut().find(|n| n.node_id == decision.node_id) {
            Some(existing) => *existing = decision.clone(),
            None => self.nodes.push(decision.clone()),
        }
        self.updated_at = Utc::now();
    }

    /// Winners derived from the node decisions.
    pub fn selection(&self) -> RunSelection {
        let mut selection = RunSelection::new(&self.run_id);
        for node in &self.nodes {
            if let Some(sel) = &node.selected {
                selection.selected.insert(node.node_id.clone(), sel.clone());
            }
        }
        selection
    }
}

/// Sink for provenance records, called by the attempt controller.
pub trait DecisionRecorder: Send {
    fn record_candidate(&mut self, artifact: &CandidateArtifact) -> Result<()>;

    /// Persist the node's decision as it stands now.
    fn record_decision(&mut self, decision: &NodeDecision) -> Result<()>;
}

/// Filesystem recorder.
pub struct ProvenanceLogger {
    run_dir: PathBuf,
    log: DecisionLog,
}

impl ProvenanceLogger {
    /// Create `<root>/<run_id>/` and start an empty log.
    pub fn new(root: impl AsRef<Path>, run_id: &str) -> Result<Self> {
        let run_dir = resolve_run_dir(root.as_ref(), run_id)?;
        std::fs::create_dir_all(run_dir.join(CANDIDATES_DIR))?;
        Ok(Self {
            run_dir,
            log: DecisionLog::new(run_id),
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn decisions_path(&self) -> PathBuf {
        self.run_dir.join(DECISIONS_FILE)
    }

    pub fn selection_path(&self) -> PathBuf {
        self.run_dir.join(SELECTION_FILE)
    }

    pub fn candidate_path(&self, node_id: &str, attempt: u32, candidate: u32) -> PathBuf {
        self.run_dir
            .join(CANDIDATES_DIR)
            .join(sanitize(node_id))
            .join(format!("attempt-{attempt}-candidate-{candidate}.json"))
    }

    pub fn log(&self) -> &DecisionLog {
        &self.log
    }
}

impl DecisionRecorder for ProvenanceLogger {
    fn record_candidate(&mut self, artifact: &CandidateArtifact) -> Result<()> {
        let path = self.candidate_path(&artifact.node_id, artifact.attempt, artifact.candidate);
        write_json_atomic(&path, artifact)
    }

    fn record_decision(&mut self, decision: &NodeDecision) -> Result<()> {
        decision.validate()?;
        self.log.upsert(decision);
        write_json_atomic(&self.decisions_path(), &self.log)?;
        write_json_atomic(&self.selection_path(), &self.log.selection())
    }
}

/// Read `decisions.json` for `run_id`, validating every node decision.
pub fn load_decisions(root: &Path, run_id: &str) -> Result<DecisionLog> {
    let bytes = std::fs::read(resolve_run_dir(root, run_id)?.join(DECISIONS_FILE))?;
    let log: DecisionLog = serde_json::from_slice(&bytes)?;
    if log.schema_version != DECISION_LOG_SCHEMA_VERSION {
        return Err(DasError::InvalidDecision(format!(
            "unsupported decision log schema {}",
            log.schema_version
        )));
    }
    for node in &log.nodes {
        node.validate()?;
    }
    Ok(log)
}

/// Read `selection.json` for `run_id`.
pub fn load_selection(root: &Path, run_id: &str) -> Result<RunSelection> {
    let bytes = std::fs::read(resolve_run_dir(root, run_id)?.join(SELECTION_FILE))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// `<root>/<run_id>`, refusing ids that would resolve anywhere else.
fn resolve_run_dir(root: &Path, run_id: &str) -> Result<PathBuf> {
    let mut parts = Path::new(run_id).components();
    let single_segment = matches!((parts.next(), parts.next()), (Some(Component::Normal(_)), None));
    if !single_segment || run_id.contains(['/', '\\']) {
        return Err(DasError::InvalidRunId(run_id.to_string()));
    }
    Ok(root.join(run_id))
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| DasError::InvalidDecision(format!("{} has no parent", path.display())))?;
    std::fs::create_dir_all(dir)?;
    let json = serde_json::to_vec_pretty(value)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&json)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Node ids become directory names. Ids already in the safe alphabet are
/// used as is; anything else gets a digest suffix after a `.`, which the
/// safe alphabet never contains.
fn sanitize(node_id: &str) -> String {
    let cleaned: String = node_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !cleaned.is_empty() && cleaned == node_id {
        return cleaned;
    }
    let digest = hex::encode(Sha256::digest(node_id.as_bytes()));
    let stem = if cleaned.is_empty() { "_" } else { cleaned.as_str() };
    format!("{stem}.{}", &digest[..16])
}

/// In-memory recorder keeping every decision snapshot.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    pub candidates: Vec<CandidateArtifact>,
    pub snapshots: Vec<NodeDecision>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest snapshot for `node_id`.
    pub fn latest(&self, node_id: &str) -> Option<&NodeDecision> {
        self.snapshots.iter().rev().find(|d| d.node_id == node_id)
    }
}

impl DecisionRecorder for MemoryRecorder {
    fn record_candidate(&mut self, artifact: &CandidateArtifact) -> Result<()> {
        self.candidates.push(artifact.clone());
        Ok(())
    }

    fn record_decision(&mut self, decision: &NodeDecision) -> Result<()> {
        decision.validate()?;
        self.snapshots.push(decision.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AttemptRecord, AttemptStatus, CandidateResult, OnHardFail, Policy, SelectedRef,
    };
    use serde_json::json;

    fn policy() -> Policy {
        Policy {
            enabled: true,
            candidates_per_attempt: 1,
            max_attempts: 2,
            gates: vec![],
            on_hard_fail: OnHardFail::StopRun,
            params: Default::default(),
        }
    }

    fn selected_decision() -> NodeDecision {
        let mut d = NodeDecision::new("routine", policy());
        d.attempts.push(AttemptRecord {
            attempt: 1,
            candidates: vec![CandidateResult::evaluated(1, 1, vec![], 1.0, "abc".into())],
            selected_candidate: Some(1),
            status: AttemptStatus::Selected,
        });
        d.selected = Some(SelectedRef {
            attempt: 1,
            candidate: 1,
            score: 1.0,
            artifact_ref: "abc".into(),
        });
        d
    }

    #[test]
    fn writes_and_reloads_both_documents() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = ProvenanceLogger::new(dir.path(), "run-1").unwrap();
        logger.record_decision(&selected_decision()).unwrap();

        let log = load_decisions(dir.path(), "run-1").unwrap();
        assert_eq!(log.nodes.len(), 1);
        let sel = load_selection(dir.path(), "run-1").unwrap();
        assert_eq!(sel.selected["routine"].artifact_ref, "abc");
    }

    #[test]
    fn upsert_replaces_node_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = ProvenanceLogger::new(dir.path(), "run-1").unwrap();
        let mut d = NodeDecision::new("control", policy());
        d.attempts.push(AttemptRecord::open(1));
        logger.record_decision(&d).unwrap();
        logger.record_decision(&selected_decision()).unwrap();
        d.attempts[0].status = AttemptStatus::Retry;
        d.attempts.push(AttemptRecord::open(2));
        logger.record_decision(&d).unwrap();

        let log = load_decisions(dir.path(), "run-1").unwrap();
        let ids: Vec<_> = log.nodes.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(ids, vec!["control", "routine"]);
        assert_eq!(log.node("control").unwrap().attempts.len(), 2);
    }

    #[test]
    fn refuses_dangling_selection() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = ProvenanceLogger::new(dir.path(), "run-1").unwrap();
        let mut d = selected_decision();
        d.attempts[0].candidates[0].ok = false;
        assert!(logger.record_decision(&d).is_err());
        assert!(!logger.decisions_path().exists());
    }

    #[test]
    fn tampered_log_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = ProvenanceLogger::new(dir.path(), "run-1").unwrap();
        logger.record_decision(&selected_decision()).unwrap();

        let path = logger.decisions_path();
        let mut raw: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        raw["nodes"][0]["selected"]["candidate"] = json!(7);
        std::fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();

        assert!(matches!(
            load_decisions(dir.path(), "run-1"),
            Err(DasError::InvalidDecision(_))
        ));
    }

    #[test]
    fn candidate_files_use_sanitized_node_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = ProvenanceLogger::new(dir.path(), "run-1").unwrap();
        let artifact = CandidateArtifact {
            run_id: "run-1".into(),
            node_id: "../escape me".into(),
            attempt: 2,
            candidate: 3,
            template_offset: 5,
            input: NodeInput::new("../escape me", json!({})),
            output: Some(json!({"title": "AM"})),
            error: None,
            artifact_ref: Some("abc".into()),
            created_at: Utc::now(),
        };
        logger.record_candidate(&artifact).unwrap();

        let path = logger.candidate_path("../escape me", 2, 3);
        assert!(path.starts_with(dir.path().join("run-1/candidates")));
        let node_dir = path.parent().unwrap().file_name().unwrap().to_str().unwrap();
        assert!(node_dir.starts_with("___escape_me."), "{node_dir}");
        let stored: CandidateArtifact =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(stored, artifact);
    }

    #[test]
    fn distinct_node_ids_never_share_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ProvenanceLogger::new(dir.path(), "run-1").unwrap();
        let ids = ["a_b", "a/b", "a.b", "a b", "", "_"];
        let dirs: std::collections::BTreeSet<PathBuf> = ids
            .iter()
            .map(|id| logger.candidate_path(id, 1, 1))
            .collect();
        assert_eq!(dirs.len(), ids.len());
        assert!(logger
            .candidate_path("routine", 1, 1)
            .ends_with("candidates/routine/attempt-1-candidate-1.json"));
    }

    #[test]
    fn run_ids_that_leave_the_root_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("runs");
        let outside = dir.path().join("outside");
        let absolute = outside.to_str().unwrap().to_string();
        for run_id in ["", ".", "..", "../escaped", "a/b", "a\\b", absolute.as_str()] {
            assert!(
                matches!(
                    ProvenanceLogger::new(&root, run_id),
                    Err(DasError::InvalidRunId(_))
                ),
                "{run_id:?} should be rejected"
            );
            assert!(matches!(
                load_decisions(&root, run_id),
                Err(DasError::InvalidRunId(_))
            ));
            assert!(matches!(
                load_selection(&root, run_id),
                Err(DasError::InvalidRunId(_))
            ));
        }
        assert!(!dir.path().join("escaped").exists());
        assert!(!outside.exists());
    }
}
