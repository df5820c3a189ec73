//! Storage trait definitions for TLC
//!
//! These traits define the two persistence seams of the release pipeline:
//! - `AuditStore`: the append-only, hash-chained audit ledger
//! - `ReleaseStore`: one mutable release document per tag
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// AuditStore: hash-chained audit ledger
// ---------------------------------------------------------------------------

/// A single entry of the audit ledger.
///
/// `checksum` is computed by the ledger over every other field; the store
/// persists entries verbatim and never recomputes anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Unique entry identifier
    pub id: String,
    /// Action that produced the entry (e.g. "created", "gates-failed")
    pub event: String,
    /// Release tag the entry concerns
    pub tag: String,
    /// User or system that performed the action
    pub user: String,
    /// When the action was recorded
    pub timestamp: DateTime<Utc>,
    /// Free-form details
    pub metadata: serde_json::Value,
    /// Checksum of the entry before this one (`None` for the first entry)
    pub previous_checksum: Option<String>,
    /// Checksum over this entry's fields and `previous_checksum`
    pub checksum: String,
}

/// Append-only audit ledger storage.
///
/// Guarantees:
/// - Entries are returned in append order.
/// - `append` only succeeds when `entry.previous_checksum` equals the
///   checksum of the current tail (or is `None` on an empty ledger), so two
///   writers can never both extend the same tail.
/// - Stored entries are never updated or deleted.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append an entry, returning its zero-based position in the ledger.
    async fn append(&self, entry: AuditEntry) -> StorageResult<u64>;

    /// The most recently appended entry, if any.
    async fn tail(&self) -> StorageResult<Option<AuditEntry>>;

    /// Every entry in append order.
    async fn entries(&self) -> StorageResult<Vec<AuditEntry>>;

    /// Entries for one tag in append order.
    async fn entries_for_tag(&self, tag: &str) -> StorageResult<Vec<AuditEntry>>;
}

// ---------------------------------------------------------------------------
// ReleaseStore: release documents
// ---------------------------------------------------------------------------

/// A release aggregate persisted as an opaque JSON document keyed by tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseDocument {
    /// Unique, immutable key
    pub tag: String,
    /// Serialized release body
    pub body: serde_json::Value,
    /// Store revision the document was read at; 0 right after `insert`
    #[serde(default)]
    pub revision: u64,
}

impl ReleaseDocument {
    pub fn new(tag: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            tag: tag.into(),
            body,
            revision: 0,
        }
    }

    /// Set the revision an `update` expects to replace.
    pub fn at_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }
}

/// Release document storage.
///
/// Semantics:
/// - `insert` fails with `ReleaseExists` when the tag is already stored and
///   stores the document at revision 0.
/// - `update` is a compare-and-set: it fails with `ReleaseNotFound` when the
///   tag was never inserted and with `ReleaseConflict` when the stored
///   revision is not `doc.revision`. On success the stored revision is
///   bumped and returned.
/// - `remove` exists only to undo an `insert` whose creation could not be
///   audited.
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Store a new release document.
    async fn insert(&self, doc: ReleaseDocument) -> StorageResult<()>;

    /// Replace the body of the release stored at `doc.revision`, returning
    /// the new revision.
    async fn update(&self, doc: ReleaseDocument) -> StorageResult<u64>;

    /// Delete a release document, returning whether one was stored.
    async fn remove(&self, tag: &str) -> StorageResult<bool>;

    /// Fetch a release document by tag.
    async fn get(&self, tag: &str) -> StorageResult<Option<ReleaseDocument>>;

    /// Every stored release document (unordered).
    async fn list(&self) -> StorageResult<Vec<ReleaseDocument>>;
}

/// Check a proposed chain link against the current tail.
///
/// Shared by every `AuditStore` implementation so conflict reporting is
/// identical across backends.
pub fn check_chain_link(
    tail_checksum: Option<&str>,
    entry: &AuditEntry,
) -> StorageResult<()> {
    if entry.previous_checksum.as_deref() != tail_checksum {
        return Err(StorageError::ChainConflict {
            expected: tail_checksum.map(str::to_string),
            actual: entry.previous_checksum.clone(),
        });
    }
    Ok(())
}
