//! DAS Store: scorecard persistence for the generation scheduler.
//!
//! Judge scorecards are expensive to compute, so the golden side of a
//! regression comparison is stored once and reused until any part of its
//! key drifts.
//!
//! ## Key Components
//!
//! - `ScorecardStore`: async, backend-agnostic scorecard persistence
//! - `MemoryScorecardStore`: in-memory fake for tests and short-lived runs
//! - `FsScorecardStore`: filesystem store with atomic writes

mod error;
pub mod fakes;
pub mod fs;
pub mod storage_traits;

pub use error::StorageError;
pub use fakes::MemoryScorecardStore;
pub use fs::FsScorecardStore;
pub use storage_traits::{ContentDigest, Scorecard, ScorecardKey, ScorecardStore, StorageResult};
