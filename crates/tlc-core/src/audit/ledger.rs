//! Append-only, hash-chained audit ledger.
//!
//! Every append runs read-tail / link / seal / store inside one async
//! critical section. The store's conditional append catches writers in
//! other processes; the ledger retries those conflicts a bounded number of
//! times against the fresh tail.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tlc_state::{AuditEntry, AuditStore, StorageError};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use super::checksum::{seal, verify_chain, IntegrityReport};
use super::export::{render, ExportOptions};
use super::query::AuditQuery;
use crate::domain::{PipelineError, Result};
use crate::metrics::METRICS;
use crate::obs;

/// Conflict retries before an append gives up.
pub const MAX_CHAIN_CONFLICT_RETRIES: usize = 3;

/// An event to record: what happened, who did it, and structured details.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub action: String,
    pub user: String,
    pub details: Map<String, Value>,
}

impl AuditEvent {
    pub fn new(action: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            user: user.into(),
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Latest known status of one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagSummary {
    pub tag: String,
    pub status: String,
    pub last_event: String,
    pub last_updated: DateTime<Utc>,
}

/// Release status implied by an event, if the event changes status at all.
fn status_for_event(event: &str) -> Option<&str> {
    match event {
        "created" => Some("pending"),
        "gates-retried" => Some("gates-running"),
        "gates-passed" | "gates-failed" | "deployed" | "accepted" | "rejected" | "promoted" => {
            Some(event)
        }
        _ => None,
    }
}

pub struct AuditLedger {
    store: Arc<dyn AuditStore>,
    append_lock: Mutex<()>,
}

impl AuditLedger {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            append_lock: Mutex::new(()),
        }
    }

    /// Append one event for `tag`, linked to the current tail.
    pub async fn record_event(&self, tag: &str, event: AuditEvent) -> Result<AuditEntry> {
        let _guard = self.append_lock.lock().await;

        let mut conflicts = 0;
        loop {
            let tail = self.store.tail().await?;
            let mut entry = AuditEntry {
                id: Uuid::new_v4().to_string(),
                event: event.action.clone(),
                tag: tag.to_string(),
                user: event.user.clone(),
                timestamp: Utc::now().trunc_subsecs(3),
                metadata: Value::Object(event.details.clone()),
                previous_checksum: tail.map(|t| t.checksum),
                checksum: String::new(),
            };
            seal(&mut entry);

            match self.store.append(entry.clone()).await {
                Ok(position) => {
                    METRICS.inc_audit_appends();
                    obs::emit_audit_appended(tag, &entry.event, position);
                    return Ok(entry);
                }
                Err(StorageError::ChainConflict { .. }) if conflicts < MAX_CHAIN_CONFLICT_RETRIES => {
                    conflicts += 1;
                    warn!(tag = %tag, attempt = conflicts, "audit chain moved underneath append, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Chronological entries for one tag.
    pub async fn get_audit_trail(&self, tag: &str) -> Result<Vec<AuditEntry>> {
        Ok(self.store.entries_for_tag(tag).await?)
    }

    /// One row per tag, most recently updated first.
    pub async fn get_summary(&self) -> Result<Vec<TagSummary>> {
        let mut by_tag: BTreeMap<String, TagSummary> = BTreeMap::new();
        for entry in self.store.entries().await? {
            let summary = by_tag
                .entry(entry.tag.clone())
                .or_insert_with(|| TagSummary {
                    tag: entry.tag.clone(),
                    status: "unknown".to_string(),
                    last_event: String::new(),
                    last_updated: entry.timestamp,
                });
            if let Some(status) = status_for_event(&entry.event) {
                summary.status = status.to_string();
            }
            summary.last_event = entry.event;
            summary.last_updated = entry.timestamp;
        }

        let mut rows: Vec<TagSummary> = by_tag.into_values().collect();
        rows.sort_by(|a, b| b.last_updated.cmp(&a.last_updated).then(a.tag.cmp(&b.tag)));
        Ok(rows)
    }

    pub async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
        Ok(query.apply(self.store.entries().await?))
    }

    /// Recompute the whole chain.
    pub async fn verify_integrity(&self) -> Result<IntegrityReport> {
        let entries = self.store.entries().await?;
        let report = verify_chain(&entries);
        obs::emit_integrity_checked(report.total_entries, report.tampered_entries.len());
        Ok(report)
    }

    /// Like [`verify_integrity`](Self::verify_integrity), but a broken chain
    /// is an error.
    pub async fn ensure_integrity(&self) -> Result<IntegrityReport> {
        let report = self.verify_integrity().await?;
        if !report.valid {
            return Err(PipelineError::Integrity {
                tampered: report.tampered_entries.len(),
            });
        }
        Ok(report)
    }

    pub async fn export(&self, options: &ExportOptions) -> Result<String> {
        let entries = self.query(&options.filter).await?;
        render(&entries, options, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tlc_state::fakes::MemoryAuditStore;

    fn ledger() -> (Arc<MemoryAuditStore>, AuditLedger) {
        let store = Arc::new(MemoryAuditStore::new());
        let ledger = AuditLedger::new(store.clone());
        (store, ledger)
    }

    #[tokio::test]
    async fn first_entry_has_no_previous_checksum() {
        let (_, ledger) = ledger();
        let entry = ledger
            .record_event("v1.0.0-rc.1", AuditEvent::new("created", "ci"))
            .await
            .unwrap();
        assert!(entry.previous_checksum.is_none());
        assert_eq!(entry.checksum.len(), 64);
    }

    #[tokio::test]
    async fn entries_link_across_tags() {
        let (_, ledger) = ledger();
        let a = ledger
            .record_event("v1.0.0-rc.1", AuditEvent::new("created", "ci"))
            .await
            .unwrap();
        let b = ledger
            .record_event("v2.0.0-beta.1", AuditEvent::new("created", "ci"))
            .await
            .unwrap();
        assert_eq!(b.previous_checksum.as_deref(), Some(a.checksum.as_str()));
    }

    #[tokio::test]
    async fn details_become_metadata() {
        let (_, ledger) = ledger();
        let entry = ledger
            .record_event(
                "v1.0.0-rc.1",
                AuditEvent::new("rejected", "qa").with_detail("reason", "flaky login"),
            )
            .await
            .unwrap();
        assert_eq!(entry.metadata, json!({ "reason": "flaky login" }));
    }

    #[tokio::test]
    async fn storage_failure_propagates() {
        let (store, ledger) = ledger();
        store.fail_appends(true);
        let err = ledger
            .record_event("v1.0.0", AuditEvent::new("created", "ci"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "storage");
    }

    #[tokio::test]
    async fn summary_tracks_latest_status() {
        let (_, ledger) = ledger();
        for (tag, action) in [
            ("v1.0.0-rc.1", "created"),
            ("v1.0.0-rc.1", "gates-passed"),
            ("v1.1.0-dev.1", "created"),
            ("v1.0.0-rc.1", "access-denied"),
        ] {
            ledger
                .record_event(tag, AuditEvent::new(action, "ci"))
                .await
                .unwrap();
        }

        let summary = ledger.get_summary().await.unwrap();
        assert_eq!(summary.len(), 2);
        let rc = summary.iter().find(|s| s.tag == "v1.0.0-rc.1").unwrap();
        assert_eq!(rc.status, "gates-passed");
        assert_eq!(rc.last_event, "access-denied");
        let dev = summary.iter().find(|s| s.tag == "v1.1.0-dev.1").unwrap();
        assert_eq!(dev.status, "pending");
    }

    #[tokio::test]
    async fn ensure_integrity_fails_on_tampering() {
        let (store, ledger) = ledger();
        ledger
            .record_event("v1.0.0", AuditEvent::new("created", "ci"))
            .await
            .unwrap();
        let mut entries = store.entries().await.unwrap();
        entries[0].event = "promoted".to_string();
        let tampered = AuditLedger::new(Arc::new(MemoryAuditStore::from_entries(entries)));

        assert!(ledger.ensure_integrity().await.is_ok());
        let err = tampered.ensure_integrity().await.unwrap_err();
        assert!(matches!(err, PipelineError::Integrity { tampered: 1 }));
    }
}
