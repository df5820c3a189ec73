//! Quality gates and their outcomes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{PipelineError, Result};

/// A named quality check a release must pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateName {
    Tests,
    Security,
    Coverage,
    QaApproval,
}

impl GateName {
    pub const ALL: [GateName; 4] = [
        GateName::Tests,
        GateName::Security,
        GateName::Coverage,
        GateName::QaApproval,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tests => "tests",
            Self::Security => "security",
            Self::Coverage => "coverage",
            Self::QaApproval => "qa-approval",
        }
    }

    /// Automated gates are dispatched to a runner. `qa-approval` is
    /// satisfied by a reviewer accepting the release instead.
    pub fn is_automated(&self) -> bool {
        !matches!(self, Self::QaApproval)
    }
}

impl fmt::Display for GateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GateName {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        GateName::ALL
            .into_iter()
            .find(|gate| gate.as_str() == s)
            .ok_or_else(|| PipelineError::Format(format!("unknown gate '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Pass,
    Fail,
}

/// Outcome of a single gate run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    pub gate: GateName,
    pub status: GateStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl GateResult {
    pub fn pass(gate: GateName) -> Self {
        Self {
            gate,
            status: GateStatus::Pass,
            detail: None,
        }
    }

    pub fn fail(gate: GateName, detail: impl Into<String>) -> Self {
        Self {
            gate,
            status: GateStatus::Fail,
            detail: Some(detail.into()),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == GateStatus::Pass
    }
}

/// Aggregated outcome of a gate run. `passed` holds iff every result passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResults {
    pub passed: bool,
    pub results: Vec<GateResult>,
}

impl GateResults {
    pub fn from_results(mut results: Vec<GateResult>) -> Self {
        results.sort_by_key(|r| r.gate);
        results.dedup_by_key(|r| r.gate);
        let passed = results.iter().all(GateResult::passed);
        Self { passed, results }
    }

    pub fn failing_gates(&self) -> Vec<GateName> {
        self.results
            .iter()
            .filter(|r| !r.passed())
            .map(|r| r.gate)
            .collect()
    }

    /// Replace results for re-run gates, keeping earlier passes.
    pub fn merge(&self, rerun: Vec<GateResult>) -> Self {
        let mut results: Vec<GateResult> = self
            .results
            .iter()
            .filter(|existing| !rerun.iter().any(|r| r.gate == existing.gate))
            .cloned()
            .collect();
        results.extend(rerun);
        Self::from_results(results)
    }
}
