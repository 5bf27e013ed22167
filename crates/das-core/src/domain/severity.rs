//! Gate outcome severity.

use serde::{Deserialize, Serialize};

/// Blocking strength of a gate outcome, ordered `Info < Warn < HardFail`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warn,
    HardFail,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::HardFail => "hard_fail",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The more severe of `a` and `b`.
pub fn worse_of(a: Severity, b: Severity) -> Severity {
    a.max(b)
}
