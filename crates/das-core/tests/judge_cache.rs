//! Golden scorecard caching through the `golden_regression` gate.
//!
//! The golden fixture is judged once per (fixture, judge model, prompt
//! version, rubric) and reused across runs and process restarts; the
//! candidate side is judged on every evaluation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use das_core::judge::Criterion;
use das_core::{
    AttemptStatus, FsScorecardStore, GateRegistry, Generator, GeneratorError,
    GoldenRegressionGate, Judge, JudgeConfig, JudgeError, JudgeRequest, MemoryRecorder, Mode,
    NodeInput, Orchestrator, PipelineNode, PolicyConfig, Rubric, RunRequest, ScorecardCache,
};

/// Scores `clarity` from the content's `/clarity` field and counts calls
/// separately for the golden fixture and everything else.
#[derive(Default)]
struct CountingJudge {
    golden_calls: AtomicU32,
    candidate_calls: AtomicU32,
}

#[async_trait]
impl Judge for CountingJudge {
    async fn judge(&self, request: &JudgeRequest) -> Result<Value, JudgeError> {
        if request.content.get("golden").is_some() {
            self.golden_calls.fetch_add(1, Ordering::SeqCst);
        } else {
            self.candidate_calls.fetch_add(1, Ordering::SeqCst);
        }
        let clarity = request.content["clarity"].as_f64().unwrap_or(0.0);
        Ok(json!({"criteria": [{"id": "clarity", "score": clarity}], "overall": clarity}))
    }
}

struct Fixed(Value);

#[async_trait]
impl Generator for Fixed {
    async fn generate(&self, _input: &NodeInput, _offset: u32) -> Result<Value, GeneratorError> {
        Ok(self.0.clone())
    }
}

fn golden_fixture() -> Value {
    json!({"golden": true, "clarity": 0.8, "steps": ["cleanse", "moisturize"]})
}

fn config(prompt_version: &str) -> PolicyConfig {
    let doc = json!({
        "version": 1,
        "defaults": {
            "gates": [{
                "gate_id": "golden_regression",
                "params": {
                    "fixture": "am_routine",
                    "rubric": {
                        "id": "routine_quality",
                        "version": "1",
                        "criteria": [{"id": "clarity", "description": "clear steps", "max_drop": 0.1}]
                    },
                    "judge": {"model": "judge-large", "prompt_version": prompt_version}
                }
            }]
        }
    });
    PolicyConfig::from_json_str(&doc.to_string()).unwrap()
}

fn registry(judge: Arc<CountingJudge>, cache: Arc<ScorecardCache>) -> GateRegistry {
    GateRegistry::standard().with_gate(Arc::new(
        GoldenRegressionGate::new(cache)
            .with_judge(judge)
            .with_fixture("am_routine", golden_fixture()),
    ))
}

async fn run_once(registry: GateRegistry, prompt_version: &str, clarity: f64) -> AttemptStatus {
    let nodes = [PipelineNode::new(
        "routine",
        Arc::new(Fixed(json!({"clarity": clarity}))),
        json!({}),
    )];
    let report = Orchestrator::new(config(prompt_version), registry)
        .run(
            &RunRequest::new("routine_authoring", Mode::Seed),
            &nodes,
            &mut MemoryRecorder::new(),
        )
        .await;
    match report {
        Ok(report) => report.decision("routine").unwrap().status().unwrap(),
        Err(das_core::DasError::RunAborted { status, .. }) => status,
        Err(other) => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn same_judge_config_reuses_golden_scorecard() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsScorecardStore::new(dir.path()).unwrap());
    let cache = Arc::new(ScorecardCache::new(store));
    let judge = Arc::new(CountingJudge::default());

    for _ in 0..3 {
        let status = run_once(registry(judge.clone(), cache.clone()), "p1", 0.75).await;
        assert_eq!(status, AttemptStatus::Selected);
    }
    assert_eq!(judge.golden_calls.load(Ordering::SeqCst), 1);
    assert_eq!(judge.candidate_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn prompt_version_change_rejudges_golden() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsScorecardStore::new(dir.path()).unwrap());
    let cache = Arc::new(ScorecardCache::new(store));
    let judge = Arc::new(CountingJudge::default());

    run_once(registry(judge.clone(), cache.clone()), "p1", 0.75).await;
    run_once(registry(judge.clone(), cache.clone()), "p2", 0.75).await;
    run_once(registry(judge.clone(), cache.clone()), "p2", 0.75).await;
    assert_eq!(judge.golden_calls.load(Ordering::SeqCst), 2);

    // Going back to p1 still hits the original entry.
    run_once(registry(judge.clone(), cache), "p1", 0.75).await;
    assert_eq!(judge.golden_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cache_survives_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let judge = Arc::new(CountingJudge::default());
    let config = JudgeConfig::new("judge-large", "p1");
    let rubric = Rubric {
        id: "routine_quality".into(),
        version: "1".into(),
        criteria: vec![Criterion {
            id: "clarity".into(),
            description: "clear steps".into(),
            max_drop: 0.1,
        }],
    };

    let first = ScorecardCache::new(Arc::new(FsScorecardStore::new(dir.path()).unwrap()));
    let (card, hit) = first
        .golden_scorecard(judge.as_ref(), &config, &rubric, &golden_fixture())
        .await
        .unwrap();
    assert!(!hit);
    drop(first);

    let second = ScorecardCache::new(Arc::new(FsScorecardStore::new(dir.path()).unwrap()));
    let (again, hit) = second
        .golden_scorecard(judge.as_ref(), &config, &rubric, &golden_fixture())
        .await
        .unwrap();
    assert!(hit);
    assert_eq!(card, again);
    assert_eq!(judge.golden_calls.load(Ordering::SeqCst), 1);

    // A rubric edit without a version bump still changes the key.
    let mut edited = rubric.clone();
    edited.criteria[0].description = "concise steps".into();
    let (_, hit) = second
        .golden_scorecard(judge.as_ref(), &config, &edited, &golden_fixture())
        .await
        .unwrap();
    assert!(!hit);
    assert_eq!(judge.golden_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn regression_blocks_candidate() {
    let cache = Arc::new(ScorecardCache::new(Arc::new(
        das_core::MemoryScorecardStore::new(),
    )));
    let judge = Arc::new(CountingJudge::default());
    let status = run_once(registry(judge, cache), "p1", 0.5).await;
    assert_eq!(status, AttemptStatus::Exhausted);
}
