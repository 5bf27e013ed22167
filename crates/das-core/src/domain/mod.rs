//! Domain models for DAS.
//!
//! Canonical definitions for the core entities:
//! - `Policy`: resolved per-node scheduling policy
//! - `GateResult` / `CandidateResult`: immutable evaluation records
//! - `NodeDecision` / `RunSelection`: provenance documents
//! - `EvalContext`: read-only context handed to every gate

pub mod context;
pub mod decision;
pub mod digest;
pub mod error;
pub mod policy;
pub mod severity;

// Re-export main types and errors
pub use context::{EvalContext, Mode};
pub use decision::{
    bounded_detail, AttemptRecord, AttemptStatus, CandidateResult, GateResult, NodeDecision,
    RunSelection, SelectedRef, MAX_DETAIL_CHARS,
};
pub use error::{ConfigError, DasError, Result};
pub use policy::{GateInstance, OnHardFail, Policy, PolicyPartial, UnknownGatePolicy};
pub use severity::{worse_of, Severity};
