//! Error taxonomy for the release gating pipeline.

use tlc_state::StorageError;

/// Pipeline errors.
///
/// Format, not-found, state, reason-required, authorization and integrity
/// failures are reported to the caller. Upstream and storage failures are
/// fatal for the current operation and propagate as-is.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid format: {0}")]
    Format(String),

    #[error("release not found: {tag}")]
    NotFound { tag: String },

    #[error("invalid state for {tag}: {detail}")]
    State { tag: String, detail: String },

    #[error("a non-empty reason is required to reject {tag}")]
    ReasonRequired { tag: String },

    #[error("role '{role}' is not permitted to {action}")]
    Authorization { role: String, action: String },

    #[error("audit ledger integrity check failed: {tampered} tampered entries")]
    Integrity { tampered: usize },

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable machine-readable kind, used by adapters and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Format(_) => "format",
            Self::NotFound { .. } => "not-found",
            Self::State { .. } => "state",
            Self::ReasonRequired { .. } => "reason-required",
            Self::Authorization { .. } => "authorization",
            Self::Integrity { .. } => "integrity",
            Self::Upstream(_) => "upstream",
            Self::Storage(_) => "storage",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
        }
    }

    /// Whether the error is a caller-facing rejection rather than an
    /// infrastructure failure.
    pub fn is_reported(&self) -> bool {
        matches!(
            self,
            Self::Format(_)
                | Self::NotFound { .. }
                | Self::State { .. }
                | Self::ReasonRequired { .. }
                | Self::Authorization { .. }
                | Self::Integrity { .. }
        )
    }

    pub(crate) fn state(tag: &str, detail: impl Into<String>) -> Self {
        Self::State {
            tag: tag.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn not_found(tag: &str) -> Self {
        Self::NotFound {
            tag: tag.to_string(),
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
