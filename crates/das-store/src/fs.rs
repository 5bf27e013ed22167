use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::*;

/// Filesystem-backed scorecard store with git-style 2-char sharding.
///
/// Layout: `<root>/scorecards/<first 2 hex chars>/<remaining hex chars>.json`
pub struct FsScorecardStore {
    cards_dir: PathBuf,
}

impl FsScorecardStore {
    /// Create a store rooted at `root`. Creates `root/scorecards/` if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let cards_dir = root.as_ref().join("scorecards");
        fs::create_dir_all(&cards_dir)?;
        Ok(Self { cards_dir })
    }

    fn card_path(&self, digest: &ContentDigest) -> PathBuf {
        let hex = digest.as_str();
        self.cards_dir
            .join(&hex[..2])
            .join(format!("{}.json", &hex[2..]))
    }
}

#[async_trait]
impl ScorecardStore for FsScorecardStore {
    async fn get(&self, key: &ScorecardKey) -> StorageResult<Option<Scorecard>> {
        let path = self.card_path(&key.digest());
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn put(&self, card: &Scorecard) -> StorageResult<ContentDigest> {
        let digest = card.key().digest();
        let path = self.card_path(&digest);
        let shard_dir = self.cards_dir.join(&digest.as_str()[..2]);
        fs::create_dir_all(&shard_dir)?;

        // Atomic write: temp file in the same directory, then rename.
        let json = serde_json::to_vec_pretty(card)?;
        let mut tmp = NamedTempFile::new_in(&shard_dir)?;
        tmp.write_all(&json)?;
        tmp.persist(&path).map_err(|e| e.error)?;

        debug!(digest = %digest.short(), "scorecard stored");
        Ok(digest)
    }

    async fn remove(&self, key: &ScorecardKey) -> StorageResult<()> {
        let path = self.card_path(&key.digest());
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}
