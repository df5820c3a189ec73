//! TLC State: persistence for the release gating pipeline
//!
//! This crate owns all I/O for releases and the audit ledger.
//!
//! ## Key Components
//!
//! - `AuditStore` / `ReleaseStore`: backend-agnostic storage traits
//! - `fakes`: in-memory implementations for tests
//! - `SurrealHandle`: SurrealDB connection shared by the Surreal stores
//! - `SurrealAuditStore` / `SurrealReleaseStore`: durable implementations

mod error;
pub mod fakes;
mod handle;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_ledger;
pub mod surreal_release_store;

pub use error::{StateError, StorageError};
pub use handle::{RemoteConfig, SurrealHandle};
pub use schema::{AuditEntryRow, ReleaseRow, GENESIS_LINK};
pub use storage_traits::{
    check_chain_link, AuditEntry, AuditStore, ReleaseDocument, ReleaseStore, StorageResult,
};
pub use surreal_ledger::SurrealAuditStore;
pub use surreal_release_store::SurrealReleaseStore;

/// Result type for tlc-state connection operations
pub type Result<T> = std::result::Result<T, StateError>;
