//! Hash-keyed scorecard cache for golden fixtures.
//!
//! The golden side of a regression comparison is judged once and stored
//! under `(fixture hash, judge model, prompt version, rubric identity)`.
//! A stored scorecard is reused only when all four match exactly; any drift
//! forces a fresh judge call. Candidate content is never cached.

use std::sync::Arc;

use das_store::{Scorecard, ScorecardKey, ScorecardStore};
use serde_json::Value;
use tracing::warn;

use crate::domain::digest::compute_digest;
use crate::judge::{parse_scores, Judge, JudgeConfig, JudgeError, JudgeRequest, JudgeScores, Rubric};
use crate::metrics::METRICS;
use crate::obs::emit_judge_cache;

/// Scorecard lookup with judge fallback.
#[derive(Clone)]
pub struct ScorecardCache {
    store: Arc<dyn ScorecardStore>,
}

impl ScorecardCache {
    pub fn new(store: Arc<dyn ScorecardStore>) -> Self {
        Self { store }
    }

    /// Cache key for a fixture under a judge config and rubric.
    pub fn key_for(
        fixture: &Value,
        config: &JudgeConfig,
        rubric: &Rubric,
    ) -> Result<ScorecardKey, JudgeError> {
        let fixture_hash =
            compute_digest(fixture).map_err(|e| JudgeError::InvalidFixture(e.to_string()))?;
        Ok(ScorecardKey::new(
            fixture_hash.as_str(),
            &config.model,
            &config.prompt_version,
            rubric.identity(),
        ))
    }

    /// Scorecard for a golden fixture, judging only on a miss.
    ///
    /// Returns the scorecard and whether it came from the cache. Store
    /// failures degrade to a miss; they never turn into a pass.
    pub async fn golden_scorecard(
        &self,
        judge: &dyn Judge,
        config: &JudgeConfig,
        rubric: &Rubric,
        fixture: &Value,
    ) -> Result<(Scorecard, bool), JudgeError> {
        let key = Self::key_for(fixture, config, rubric)?;

        match self.store.get(&key).await {
            Ok(Some(card)) if card.matches(&key) => {
                METRICS.inc_judge_cache_hits();
                emit_judge_cache(&rubric.id, key.digest().short(), true);
                return Ok((card, true));
            }
            Ok(Some(_)) => {
                warn!(rubric = %rubric.id, "stored scorecard key drifted, re-judging");
            }
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "scorecard store read failed, re-judging");
            }
        }

        emit_judge_cache(&rubric.id, key.digest().short(), false);
        let scores = self.score_fresh(judge, config, rubric, fixture).await?;
        let card = Scorecard::new(&key, scores.scores, scores.overall);
        if let Err(err) = self.store.put(&card).await {
            warn!(error = %err, "scorecard store write failed");
        }
        Ok((card, false))
    }

    /// Judge `content` without consulting or populating the cache.
    pub async fn score_fresh(
        &self,
        judge: &dyn Judge,
        config: &JudgeConfig,
        rubric: &Rubric,
        content: &Value,
    ) -> Result<JudgeScores, JudgeError> {
        METRICS.inc_judge_invocations();
        let request = JudgeRequest::for_rubric(config, rubric, content);
        let raw = judge.judge(&request).await?;
        parse_scores(&raw, &rubric.criterion_ids())
    }

    /// Drop the cached scorecard for a fixture.
    pub async fn invalidate(
        &self,
        fixture: &Value,
        config: &JudgeConfig,
        rubric: &Rubric,
    ) -> Result<(), JudgeError> {
        let key = Self::key_for(fixture, config, rubric)?;
        self.store
            .remove(&key)
            .await
            .map_err(|e| JudgeError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use das_store::MemoryScorecardStore;
    use serde_json::json;

    use crate::judge::Criterion;

    struct CountingJudge {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Judge for CountingJudge {
        async fn judge(&self, request: &JudgeRequest) -> Result<Value, JudgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let criteria: Vec<Value> = request
                .criteria
                .iter()
                .map(|c| json!({"id": c.id, "score": 0.9}))
                .collect();
            Ok(json!({"criteria": criteria, "overall": 0.9}))
        }
    }

    fn rubric() -> Rubric {
        Rubric {
            id: "quality".into(),
            version: "1".into(),
            criteria: vec![Criterion {
                id: "clarity".into(),
                description: "clear".into(),
                max_drop: 0.1,
            }],
        }
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let cache = ScorecardCache::new(Arc::new(MemoryScorecardStore::new()));
        let judge = CountingJudge {
            calls: AtomicU32::new(0),
        };
        let config = JudgeConfig::new("judge-1", "p1");
        let fixture = json!({"routine": ["cleanse", "moisturize"]});

        let (first, hit) = cache
            .golden_scorecard(&judge, &config, &rubric(), &fixture)
            .await
            .unwrap();
        assert!(!hit);
        let (second, hit) = cache
            .golden_scorecard(&judge, &config, &rubric(), &fixture)
            .await
            .unwrap();
        assert!(hit);
        assert_eq!(first, second);
        assert_eq!(judge.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drifted_entry_is_not_reused() {
        let store = Arc::new(MemoryScorecardStore::new());
        let cache = ScorecardCache::new(store.clone());
        let judge = CountingJudge {
            calls: AtomicU32::new(0),
        };
        let config = JudgeConfig::new("judge-1", "p1");
        let fixture = json!({"a": 1});
        let key = ScorecardCache::key_for(&fixture, &config, &rubric()).unwrap();

        // Plant a card whose fields disagree with the address it sits at.
        let stale_key = ScorecardKey::new(&key.fixture_hash, "judge-0", "p1", &key.rubric);
        store.insert_raw(
            &key.digest(),
            Scorecard::new(&stale_key, Default::default(), 0.1),
        );

        let (card, hit) = cache
            .golden_scorecard(&judge, &config, &rubric(), &fixture)
            .await
            .unwrap();
        assert!(!hit);
        assert_eq!(card.judge_model, "judge-1");
        assert_eq!(judge.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_rejudge() {
        let cache = ScorecardCache::new(Arc::new(MemoryScorecardStore::new()));
        let judge = CountingJudge {
            calls: AtomicU32::new(0),
        };
        let config = JudgeConfig::new("judge-1", "p1");
        let fixture = json!({"a": 1});
        cache
            .golden_scorecard(&judge, &config, &rubric(), &fixture)
            .await
            .unwrap();
        cache.invalidate(&fixture, &config, &rubric()).await.unwrap();
        let (_, hit) = cache
            .golden_scorecard(&judge, &config, &rubric(), &fixture)
            .await
            .unwrap();
        assert!(!hit);
        assert_eq!(judge.calls.load(Ordering::SeqCst), 2);
    }
}
