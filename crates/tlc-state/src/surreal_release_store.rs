use async_trait::async_trait;

use crate::error::StorageError;
use crate::handle::SurrealHandle;
use crate::schema::ReleaseRow;
use crate::storage_traits::{ReleaseDocument, ReleaseStore, StorageResult};

/// SurrealDB-backed implementation of the ReleaseStore trait.
#[derive(Clone)]
pub struct SurrealReleaseStore {
    handle: SurrealHandle,
}

impl SurrealReleaseStore {
    pub fn new(handle: SurrealHandle) -> Self {
        Self { handle }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Ok(Self::new(SurrealHandle::in_memory().await?))
    }
}

#[async_trait]
impl ReleaseStore for SurrealReleaseStore {
    async fn insert(&self, doc: ReleaseDocument) -> StorageResult<()> {
        if self.get(&doc.tag).await?.is_some() {
            return Err(StorageError::ReleaseExists { tag: doc.tag });
        }

        let row = ReleaseRow::from_document(&doc.clone().at_revision(0))?;
        let response = self
            .handle
            .db()
            .query("CREATE releases CONTENT $row")
            .bind(("row", row))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        if let Err(e) = response.check() {
            let message = e.to_string();
            if message.contains("already contains") {
                return Err(StorageError::ReleaseExists { tag: doc.tag });
            }
            return Err(StorageError::Backend(message));
        }
        Ok(())
    }

    async fn update(&self, doc: ReleaseDocument) -> StorageResult<u64> {
        let row = ReleaseRow::from_document(&doc)?;
        let next = doc.revision + 1;
        let mut res = self
            .handle
            .db()
            .query(
                "UPDATE releases SET body_json = $body, revision = $next \
                 WHERE tag = $tag AND revision = $revision RETURN AFTER",
            )
            .bind(("body", row.body_json))
            .bind(("next", next))
            .bind(("tag", row.tag))
            .bind(("revision", doc.revision))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let updated: Vec<ReleaseRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if !updated.is_empty() {
            return Ok(next);
        }

        match self.get(&doc.tag).await? {
            None => Err(StorageError::ReleaseNotFound { tag: doc.tag }),
            Some(stored) => Err(StorageError::ReleaseConflict {
                tag: doc.tag,
                expected: doc.revision,
                actual: stored.revision,
            }),
        }
    }

    async fn remove(&self, tag: &str) -> StorageResult<bool> {
        let mut res = self
            .handle
            .db()
            .query("DELETE releases WHERE tag = $tag RETURN BEFORE")
            .bind(("tag", tag.to_string()))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let removed: Vec<ReleaseRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(!removed.is_empty())
    }

    async fn get(&self, tag: &str) -> StorageResult<Option<ReleaseDocument>> {
        let tag_owned = tag.to_string();
        let mut res = self
            .handle
            .db()
            .query("SELECT * FROM releases WHERE tag = $tag LIMIT 1")
            .bind(("tag", tag_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<ReleaseRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter()
            .next()
            .map(ReleaseRow::into_document)
            .transpose()
    }

    async fn list(&self) -> StorageResult<Vec<ReleaseDocument>> {
        let mut res = self
            .handle
            .db()
            .query("SELECT * FROM releases")
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<ReleaseRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(ReleaseRow::into_document).collect()
    }
}
