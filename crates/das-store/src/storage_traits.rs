//! Storage trait definitions for DAS
//!
//! - `ContentDigest`: SHA-256 hex content address
//! - `ScorecardKey`: the four-part identity of a judged fixture
//! - `ScorecardStore`: async scorecard persistence
//!
//! In-memory fakes are provided for testing via the `fakes` module.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Scorecards
// ---------------------------------------------------------------------------

/// Identity of a judged fixture.
///
/// A cached scorecard is only reusable when every field matches exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScorecardKey {
    /// SHA-256 of the fixture content.
    pub fixture_hash: String,
    /// Judge model identifier.
    pub judge_model: String,
    /// Judge prompt version.
    pub prompt_version: String,
    /// Rubric identity (id, version and criteria digest).
    pub rubric: String,
}

impl ScorecardKey {
    pub fn new(
        fixture_hash: impl Into<String>,
        judge_model: impl Into<String>,
        prompt_version: impl Into<String>,
        rubric: impl Into<String>,
    ) -> Self {
        Self {
            fixture_hash: fixture_hash.into(),
            judge_model: judge_model.into(),
            prompt_version: prompt_version.into(),
            rubric: rubric.into(),
        }
    }

    /// Storage address for this key.
    pub fn digest(&self) -> ContentDigest {
        let raw = format!(
            "{}\n{}\n{}\n{}",
            self.fixture_hash, self.judge_model, self.prompt_version, self.rubric
        );
        ContentDigest::from_bytes(raw.as_bytes())
    }
}

/// A judge's verdict on a fixture, persisted for reuse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    pub fixture_hash: String,
    pub judge_model: String,
    pub prompt_version: String,
    pub rubric: String,
    /// Per-criterion scores keyed by criterion id.
    pub scores: BTreeMap<String, f64>,
    pub overall: f64,
    pub created_at: DateTime<Utc>,
}

impl Scorecard {
    pub fn new(key: &ScorecardKey, scores: BTreeMap<String, f64>, overall: f64) -> Self {
        Self {
            fixture_hash: key.fixture_hash.clone(),
            judge_model: key.judge_model.clone(),
            prompt_version: key.prompt_version.clone(),
            rubric: key.rubric.clone(),
            scores,
            overall,
            created_at: Utc::now(),
        }
    }

    /// The key this scorecard was computed under.
    pub fn key(&self) -> ScorecardKey {
        ScorecardKey::new(
            &self.fixture_hash,
            &self.judge_model,
            &self.prompt_version,
            &self.rubric,
        )
    }

    /// True only when all four key fields match exactly.
    pub fn matches(&self, key: &ScorecardKey) -> bool {
        self.fixture_hash == key.fixture_hash
            && self.judge_model == key.judge_model
            && self.prompt_version == key.prompt_version
            && self.rubric == key.rubric
    }
}

/// Scorecard persistence.
///
/// Guarantees:
/// - `put(card)` stores under `card.key().digest()` and returns that digest.
/// - `get(key)` returns whatever was last stored under `key.digest()`;
///   callers must still check [`Scorecard::matches`].
#[async_trait]
pub trait ScorecardStore: Send + Sync {
    /// Fetch the scorecard stored for `key`, if any.
    async fn get(&self, key: &ScorecardKey) -> StorageResult<Option<Scorecard>>;

    /// Store a scorecard, replacing any previous entry with the same key.
    async fn put(&self, card: &Scorecard) -> StorageResult<ContentDigest>;

    /// Drop the entry for `key`. No-op if absent.
    async fn remove(&self, key: &ScorecardKey) -> StorageResult<()>;
}
