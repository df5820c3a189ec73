//! Row definitions for TLC SurrealDB tables
//!
//! Tables:
//! - audit_entries: one row per ledger entry, ordered by `seq`
//! - releases: one row per release tag
//!
//! JSON payloads are stored as strings so the checksummed metadata comes
//! back byte-for-byte identical to what was hashed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{AuditEntry, ReleaseDocument};

/// Chain link value stored for the first entry of the ledger
pub const GENESIS_LINK: &str = "genesis";

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Audit ledger row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntryRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing)]
    pub id: Option<surrealdb::sql::Thing>,
    /// Zero-based position in the ledger
    pub seq: u64,
    /// Entry identifier
    pub entry_id: String,
    /// Action name
    pub event: String,
    /// Release tag
    pub tag: String,
    /// Acting user
    pub user: String,
    /// Entry timestamp
    #[serde(with = "surreal_datetime")]
    pub timestamp: DateTime<Utc>,
    /// Metadata serialized as JSON text
    pub metadata_json: String,
    /// Previous entry checksum
    pub previous_checksum: Option<String>,
    /// `previous_checksum` or [`GENESIS_LINK`]; uniquely indexed
    pub chain_link: String,
    /// Entry checksum
    pub checksum: String,
}

impl AuditEntryRow {
    /// Build a row for `entry` at ledger position `seq`
    pub fn from_entry(seq: u64, entry: &AuditEntry) -> Result<Self, StorageError> {
        Ok(Self {
            id: None,
            seq,
            entry_id: entry.id.clone(),
            event: entry.event.clone(),
            tag: entry.tag.clone(),
            user: entry.user.clone(),
            timestamp: entry.timestamp,
            metadata_json: serde_json::to_string(&entry.metadata)?,
            previous_checksum: entry.previous_checksum.clone(),
            chain_link: entry
                .previous_checksum
                .clone()
                .unwrap_or_else(|| GENESIS_LINK.to_string()),
            checksum: entry.checksum.clone(),
        })
    }

    /// Convert back to the storage-trait type
    pub fn into_entry(self) -> Result<AuditEntry, StorageError> {
        Ok(AuditEntry {
            id: self.entry_id,
            event: self.event,
            tag: self.tag,
            user: self.user,
            timestamp: self.timestamp,
            metadata: serde_json::from_str(&self.metadata_json)?,
            previous_checksum: self.previous_checksum,
            checksum: self.checksum,
        })
    }
}

/// Release document row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing)]
    pub id: Option<surrealdb::sql::Thing>,
    /// Release tag
    pub tag: String,
    /// Release body serialized as JSON text
    pub body_json: String,
    /// Compare-and-set counter, bumped by every update
    #[serde(default)]
    pub revision: u64,
}

impl ReleaseRow {
    pub fn from_document(doc: &ReleaseDocument) -> Result<Self, StorageError> {
        Ok(Self {
            id: None,
            tag: doc.tag.clone(),
            body_json: serde_json::to_string(&doc.body)?,
            revision: doc.revision,
        })
    }

    pub fn into_document(self) -> Result<ReleaseDocument, StorageError> {
        Ok(ReleaseDocument {
            body: serde_json::from_str(&self.body_json)?,
            tag: self.tag,
            revision: self.revision,
        })
    }
}
