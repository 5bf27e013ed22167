//! In-memory fakes for storage traits
//!
//! `MemoryScorecardStore` satisfies the `ScorecardStore` contract without
//! touching disk. Useful in tests and for process-lifetime caches.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::storage_traits::*;

/// In-memory scorecard store backed by a `HashMap<digest, Scorecard>`.
#[derive(Debug, Default)]
pub struct MemoryScorecardStore {
    cards: Mutex<HashMap<String, Scorecard>>,
}

impl MemoryScorecardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored scorecards.
    pub fn len(&self) -> usize {
        self.cards.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite the entry at `digest` regardless of its key. Tests use this
    /// to plant a stale scorecard under a colliding address.
    pub fn insert_raw(&self, digest: &ContentDigest, card: Scorecard) {
        self.cards
            .lock()
            .unwrap()
            .insert(digest.as_str().to_string(), card);
    }
}

#[async_trait]
impl ScorecardStore for MemoryScorecardStore {
    async fn get(&self, key: &ScorecardKey) -> StorageResult<Option<Scorecard>> {
        let cards = self.cards.lock().unwrap();
        Ok(cards.get(key.digest().as_str()).cloned())
    }

    async fn put(&self, card: &Scorecard) -> StorageResult<ContentDigest> {
        let digest = card.key().digest();
        let mut cards = self.cards.lock().unwrap();
        cards.insert(digest.as_str().to_string(), card.clone());
        Ok(digest)
    }

    async fn remove(&self, key: &ScorecardKey) -> StorageResult<()> {
        let mut cards = self.cards.lock().unwrap();
        cards.remove(key.digest().as_str());
        Ok(())
    }
}
