//! SurrealDB schema migrations and initialization
//!
//! Sets up the two TLC tables with the constraints the storage traits rely
//! on. Safe to call multiple times (idempotent).

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all TLC tables in SurrealDB
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing TLC SurrealDB schema");

    init_audit_entries_table(db).await?;
    init_releases_table(db).await?;

    info!("TLC schema initialization complete");
    Ok(())
}

/// Initialize `audit_entries` table
///
/// Schema:
/// ```text
/// TABLE audit_entries {
///   seq:               INT (position in the ledger, unique)
///   entry_id:          STRING (unique)
///   event:             STRING (indexed)
///   tag:               STRING (indexed)
///   user:              STRING
///   timestamp:         DATETIME
///   metadata_json:     STRING
///   previous_checksum: STRING?
///   chain_link:        STRING (previous checksum or "genesis", unique)
///   checksum:          STRING
/// }
/// ```
///
/// The unique `chain_link` index guarantees that at most one entry can ever
/// extend a given tail, even with several processes appending at once.
async fn init_audit_entries_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing audit_entries table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS audit_entries AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_audit_seq ON TABLE audit_entries COLUMNS seq UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_audit_entry_id ON TABLE audit_entries COLUMNS entry_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_audit_chain_link ON TABLE audit_entries COLUMNS chain_link UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_audit_tag ON TABLE audit_entries COLUMNS tag;
        DEFINE INDEX IF NOT EXISTS idx_audit_event ON TABLE audit_entries COLUMNS event;
    "#;

    db.query(sql)
        .await
        .and_then(|response| response.check())
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    info!("✓ audit_entries table initialized");
    Ok(())
}

/// Initialize `releases` table
///
/// Schema:
/// ```text
/// TABLE releases {
///   tag:       STRING (unique)
///   body_json: STRING
///   revision:  INT
/// }
/// ```
async fn init_releases_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing releases table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS releases AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete FULL;

        DEFINE INDEX IF NOT EXISTS idx_release_tag ON TABLE releases COLUMNS tag UNIQUE;
    "#;

    db.query(sql)
        .await
        .and_then(|response| response.check())
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    info!("✓ releases table initialized");
    Ok(())
}
