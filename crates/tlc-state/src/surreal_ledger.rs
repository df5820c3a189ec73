//! SurrealDB-backed AuditStore implementation
//!
//! Uses `schema::AuditEntryRow` for persistence, converting to/from
//! `storage_traits::AuditEntry` at the boundary.

use async_trait::async_trait;
use tracing::debug;

use crate::error::StorageError;
use crate::handle::SurrealHandle;
use crate::schema::AuditEntryRow;
use crate::storage_traits::{check_chain_link, AuditEntry, AuditStore, StorageResult};

/// SurrealDB-backed implementation of [`AuditStore`].
#[derive(Clone)]
pub struct SurrealAuditStore {
    handle: SurrealHandle,
}

impl SurrealAuditStore {
    pub fn new(handle: SurrealHandle) -> Self {
        Self { handle }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Ok(Self::new(SurrealHandle::in_memory().await?))
    }

    async fn fetch_tail_row(&self) -> StorageResult<Option<AuditEntryRow>> {
        let mut res = self
            .handle
            .db()
            .query("SELECT * FROM audit_entries ORDER BY seq DESC LIMIT 1")
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<AuditEntryRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows.into_iter().next())
    }

    fn rows_to_entries(rows: Vec<AuditEntryRow>) -> StorageResult<Vec<AuditEntry>> {
        rows.into_iter().map(AuditEntryRow::into_entry).collect()
    }
}

#[async_trait]
impl AuditStore for SurrealAuditStore {
    async fn append(&self, entry: AuditEntry) -> StorageResult<u64> {
        let tail = self.fetch_tail_row().await?;
        check_chain_link(tail.as_ref().map(|row| row.checksum.as_str()), &entry)?;

        let seq = tail.map(|row| row.seq + 1).unwrap_or(0);
        let row = AuditEntryRow::from_entry(seq, &entry)?;

        let response = self
            .handle
            .db()
            .query("CREATE audit_entries CONTENT $row")
            .bind(("row", row))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        // A concurrent writer that extended the same tail trips the unique
        // chain_link / seq indexes.
        if let Err(e) = response.check() {
            let message = e.to_string();
            if message.contains("already contains") {
                let current = self.fetch_tail_row().await?;
                return Err(StorageError::ChainConflict {
                    expected: current.map(|row| row.checksum),
                    actual: entry.previous_checksum,
                });
            }
            return Err(StorageError::Backend(message));
        }

        debug!(seq, event = %entry.event, tag = %entry.tag, "audit entry stored");
        Ok(seq)
    }

    async fn tail(&self) -> StorageResult<Option<AuditEntry>> {
        self.fetch_tail_row()
            .await?
            .map(AuditEntryRow::into_entry)
            .transpose()
    }

    async fn entries(&self) -> StorageResult<Vec<AuditEntry>> {
        let mut res = self
            .handle
            .db()
            .query("SELECT * FROM audit_entries ORDER BY seq ASC")
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<AuditEntryRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Self::rows_to_entries(rows)
    }

    async fn entries_for_tag(&self, tag: &str) -> StorageResult<Vec<AuditEntry>> {
        let tag_owned = tag.to_string();
        let mut res = self
            .handle
            .db()
            .query("SELECT * FROM audit_entries WHERE tag = $tag ORDER BY seq ASC")
            .bind(("tag", tag_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<AuditEntryRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Self::rows_to_entries(rows)
    }
}
