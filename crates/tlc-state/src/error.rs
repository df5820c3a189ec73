//! Error types for tlc-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by the [`crate::AuditStore`] and [`crate::ReleaseStore`] traits
#[derive(Error, Debug)]
pub enum StorageError {
    /// No release document is stored under this tag
    #[error("release not found: {tag}")]
    ReleaseNotFound { tag: String },

    /// A release document already exists for this tag
    #[error("release already exists: {tag}")]
    ReleaseExists { tag: String },

    /// The release changed since it was read
    #[error("release {tag} was modified concurrently: expected revision {expected}, found {actual}")]
    ReleaseConflict {
        tag: String,
        expected: u64,
        actual: u64,
    },

    /// The appended entry does not link to the current chain tail
    #[error("audit chain conflict: tail is {expected:?}, entry links to {actual:?}")]
    ChainConflict {
        expected: Option<String>,
        actual: Option<String>,
    },

    /// Serialization of a stored document failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend-specific failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}
