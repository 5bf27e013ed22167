//! Trait contract tests for ScorecardStore.
//!
//! Both the in-memory fake and the filesystem store must satisfy these.

use std::collections::BTreeMap;

use das_store::storage_traits::*;
use das_store::{FsScorecardStore, MemoryScorecardStore};

fn key(prompt_version: &str) -> ScorecardKey {
    ScorecardKey::new("fixture-hash", "judge-1", prompt_version, "tone@1")
}

fn card(prompt_version: &str, overall: f64) -> Scorecard {
    let mut scores = BTreeMap::new();
    scores.insert("clarity".to_string(), 0.9);
    scores.insert("tone".to_string(), 0.7);
    Scorecard::new(&key(prompt_version), scores, overall)
}

async fn contract_round_trip(store: &dyn ScorecardStore) {
    let c = card("v1", 0.8);
    let digest = store.put(&c).await.unwrap();
    assert_eq!(digest, key("v1").digest());

    let got = store.get(&key("v1")).await.unwrap().expect("stored");
    assert_eq!(got, c);
    assert!(got.matches(&key("v1")));
}

async fn contract_missing_is_none(store: &dyn ScorecardStore) {
    assert!(store.get(&key("never")).await.unwrap().is_none());
}

async fn contract_put_replaces(store: &dyn ScorecardStore) {
    store.put(&card("v1", 0.1)).await.unwrap();
    store.put(&card("v1", 0.9)).await.unwrap();
    let got = store.get(&key("v1")).await.unwrap().unwrap();
    assert_eq!(got.overall, 0.9);
}

async fn contract_remove(store: &dyn ScorecardStore) {
    store.put(&card("v1", 0.5)).await.unwrap();
    store.remove(&key("v1")).await.unwrap();
    assert!(store.get(&key("v1")).await.unwrap().is_none());
    // removing twice is a no-op
    store.remove(&key("v1")).await.unwrap();
}

#[tokio::test]
async fn memory_store_round_trip() {
    contract_round_trip(&MemoryScorecardStore::new()).await;
}

#[tokio::test]
async fn memory_store_missing_is_none() {
    contract_missing_is_none(&MemoryScorecardStore::new()).await;
}

#[tokio::test]
async fn memory_store_put_replaces() {
    contract_put_replaces(&MemoryScorecardStore::new()).await;
}

#[tokio::test]
async fn memory_store_remove() {
    contract_remove(&MemoryScorecardStore::new()).await;
}

#[tokio::test]
async fn fs_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    contract_round_trip(&FsScorecardStore::new(dir.path()).unwrap()).await;
}

#[tokio::test]
async fn fs_store_missing_is_none() {
    let dir = tempfile::tempdir().unwrap();
    contract_missing_is_none(&FsScorecardStore::new(dir.path()).unwrap()).await;
}

#[tokio::test]
async fn fs_store_put_replaces() {
    let dir = tempfile::tempdir().unwrap();
    contract_put_replaces(&FsScorecardStore::new(dir.path()).unwrap()).await;
}

#[tokio::test]
async fn fs_store_remove() {
    let dir = tempfile::tempdir().unwrap();
    contract_remove(&FsScorecardStore::new(dir.path()).unwrap()).await;
}

#[tokio::test]
async fn fs_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = FsScorecardStore::new(dir.path()).unwrap();
        store.put(&card("v1", 0.42)).await.unwrap();
    }
    let reopened = FsScorecardStore::new(dir.path()).unwrap();
    let got = reopened.get(&key("v1")).await.unwrap().unwrap();
    assert_eq!(got.overall, 0.42);
}

#[tokio::test]
async fn fs_store_sharded_layout() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsScorecardStore::new(dir.path()).unwrap();
    let digest = store.put(&card("v1", 0.5)).await.unwrap();
    let hex = digest.as_str();
    let path = dir
        .path()
        .join("scorecards")
        .join(&hex[..2])
        .join(format!("{}.json", &hex[2..]));
    assert!(path.exists());
}
