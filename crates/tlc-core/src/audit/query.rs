//! Filtering and pagination over ledger entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tlc_state::AuditEntry;

/// Ledger filter. Filters apply in field order; pagination applies last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub to: Option<DateTime<Utc>>,
    pub user: Option<String>,
    pub tag: Option<String>,
    pub event: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl AuditQuery {
    pub fn for_tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.from.is_none_or(|from| entry.timestamp >= from)
            && self.to.is_none_or(|to| entry.timestamp <= to)
            && self.user.as_deref().is_none_or(|u| entry.user == u)
            && self.tag.as_deref().is_none_or(|t| entry.tag == t)
            && self.event.as_deref().is_none_or(|e| entry.event == e)
    }

    pub fn apply(&self, entries: Vec<AuditEntry>) -> Vec<AuditEntry> {
        entries
            .into_iter()
            .filter(|entry| self.matches(entry))
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}
