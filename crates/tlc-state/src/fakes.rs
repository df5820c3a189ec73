//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryAuditStore` and `MemoryReleaseStore` that satisfy the
//! trait contracts without any external dependencies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryAuditStore
// ---------------------------------------------------------------------------

/// In-memory audit ledger backed by a `Vec<AuditEntry>`.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    entries: Mutex<Vec<AuditEntry>>,
    fail_appends: AtomicBool,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with pre-existing entries, bypassing chain checks.
    ///
    /// Used to simulate ledgers whose persisted rows were altered out of
    /// band.
    pub fn from_entries(entries: Vec<AuditEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            fail_appends: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `append` fail with a backend error.
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, entry: AuditEntry) -> StorageResult<u64> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("audit store unavailable".to_string()));
        }
        let mut entries = self.entries.lock().unwrap();
        check_chain_link(entries.last().map(|e| e.checksum.as_str()), &entry)?;
        entries.push(entry);
        Ok(entries.len() as u64 - 1)
    }

    async fn tail(&self) -> StorageResult<Option<AuditEntry>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.last().cloned())
    }

    async fn entries(&self) -> StorageResult<Vec<AuditEntry>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.clone())
    }

    async fn entries_for_tag(&self, tag: &str) -> StorageResult<Vec<AuditEntry>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.iter().filter(|e| e.tag == tag).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryReleaseStore
// ---------------------------------------------------------------------------

/// In-memory release store backed by a `HashMap<tag, ReleaseDocument>`.
#[derive(Debug, Default)]
pub struct MemoryReleaseStore {
    releases: Mutex<HashMap<String, ReleaseDocument>>,
}

impl MemoryReleaseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReleaseStore for MemoryReleaseStore {
    async fn insert(&self, doc: ReleaseDocument) -> StorageResult<()> {
        let mut releases = self.releases.lock().unwrap();
        if releases.contains_key(&doc.tag) {
            return Err(StorageError::ReleaseExists { tag: doc.tag });
        }
        releases.insert(doc.tag.clone(), doc.at_revision(0));
        Ok(())
    }

    async fn update(&self, doc: ReleaseDocument) -> StorageResult<u64> {
        let mut releases = self.releases.lock().unwrap();
        let slot = releases
            .get_mut(&doc.tag)
            .ok_or_else(|| StorageError::ReleaseNotFound {
                tag: doc.tag.clone(),
            })?;
        if slot.revision != doc.revision {
            return Err(StorageError::ReleaseConflict {
                tag: doc.tag,
                expected: doc.revision,
                actual: slot.revision,
            });
        }
        let revision = doc.revision + 1;
        *slot = doc.at_revision(revision);
        Ok(revision)
    }

    async fn remove(&self, tag: &str) -> StorageResult<bool> {
        let mut releases = self.releases.lock().unwrap();
        Ok(releases.remove(tag).is_some())
    }

    async fn get(&self, tag: &str) -> StorageResult<Option<ReleaseDocument>> {
        let releases = self.releases.lock().unwrap();
        Ok(releases.get(tag).cloned())
    }

    async fn list(&self) -> StorageResult<Vec<ReleaseDocument>> {
        let releases = self.releases.lock().unwrap();
        Ok(releases.values().cloned().collect())
    }
}
