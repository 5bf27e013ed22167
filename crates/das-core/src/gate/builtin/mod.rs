//! Built-in gates.
//!
//! `structural` and `bounds` are pure functions of the artifact. The
//! policy-pack gates (`content_safety`, `pii`) and `golden_regression` need
//! collaborators (packs, judge, scorecard cache) and are registered by the
//! embedder with [`GateRegistry::register`](crate::gate::GateRegistry::register).

pub mod bounds;
pub mod golden;
pub mod pii;
pub mod policy_pack;
pub mod safety;
pub mod structural;

pub use bounds::BoundsGate;
pub use golden::GoldenRegressionGate;
pub use pii::PiiGate;
pub use policy_pack::{PolicyCriterion, PolicyPack, PolicyPacks, Risk};
pub use safety::ContentSafetyGate;
pub use structural::StructuralGate;
