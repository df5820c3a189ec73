//! Release records and the release state machine.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::error::{PipelineError, Result};
use super::gate::GateResults;
use super::tag::{ParsedTag, Tier};

/// Lifecycle state of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseState {
    Pending,
    GatesRunning,
    GatesPassed,
    GatesFailed,
    Deployed,
    Accepted,
    Rejected,
    Promoted,
}

impl ReleaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::GatesRunning => "gates-running",
            Self::GatesPassed => "gates-passed",
            Self::GatesFailed => "gates-failed",
            Self::Deployed => "deployed",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Promoted => "promoted",
        }
    }

    /// Legal transitions. Anything not listed here is refused.
    pub fn can_transition_to(&self, next: ReleaseState) -> bool {
        use ReleaseState::*;
        matches!(
            (self, next),
            (Pending, GatesRunning)
                | (GatesRunning, GatesPassed)
                | (GatesRunning, GatesFailed)
                | (GatesFailed, GatesRunning)
                | (GatesPassed, Deployed)
                | (GatesPassed, Accepted)
                | (Deployed, Accepted)
                | (GatesPassed, Rejected)
                | (GatesFailed, Rejected)
                | (Deployed, Rejected)
                | (Accepted, Promoted)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Promoted)
    }
}

impl fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked release of one tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub tag: String,
    pub tier: Tier,
    pub commit_sha: String,
    pub state: ReleaseState,
    #[serde(default)]
    pub gate_results: Option<GateResults>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub reviewer: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub promoted_tag: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Release {
    /// A new release in `pending`.
    pub fn new(tag: &ParsedTag, commit_sha: impl Into<String>) -> Self {
        let now = Utc::now().trunc_subsecs(3);
        Self {
            tag: tag.raw.clone(),
            tier: tag.tier(),
            commit_sha: commit_sha.into(),
            state: ReleaseState::Pending,
            gate_results: None,
            preview_url: None,
            reviewer: None,
            rejection_reason: None,
            promoted_tag: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, refusing transitions the state machine does not allow.
    pub fn transition(&mut self, next: ReleaseState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::State {
                tag: self.tag.clone(),
                detail: format!("cannot move from {} to {}", self.state, next),
            });
        }
        self.state = next;
        self.touch();
        Ok(())
    }

    /// Put the release back into `state` after an aborted operation.
    pub(crate) fn restore(&mut self, state: ReleaseState) {
        self.state = state;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now().trunc_subsecs(3);
    }

    pub fn parsed_tag(&self) -> Result<ParsedTag> {
        ParsedTag::parse(&self.tag)
    }
}
