//! Seam between the release manager and whatever actually runs gate checks.

use async_trait::async_trait;

use crate::domain::{GateName, GateResult, Release};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateRunnerError {
    /// The gate did not report before its deadline. Recorded as a failed gate.
    #[error("gate {gate} timed out after {timeout_secs}s")]
    TimedOut { gate: GateName, timeout_secs: u64 },

    /// The gate could not be run at all. Aborts the gate run.
    #[error("gate {gate} could not run: {message}")]
    Failed { gate: GateName, message: String },
}

/// Runs one automated gate against a release.
///
/// A failing check is `Ok` with a `fail` result; `Err` is reserved for the
/// runner itself misbehaving.
#[async_trait]
pub trait GateRunner: Send + Sync {
    async fn run(&self, gate: GateName, release: &Release) -> Result<GateResult, GateRunnerError>;
}
