//! SurrealDB Handle - Connection Management
//!
//! Opens the database the release and audit stores share. Supports
//! in-memory (tests, `--memory`), local file-backed `surrealkv://` and
//! remote WebSocket connections.

use std::path::Path;

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use tracing::{info, instrument};

use crate::error::StateError;
use crate::migrations;
use crate::Result;

const NAMESPACE: &str = "tlc";
const DATABASE: &str = "main";

/// Credentials for a remote SurrealDB instance
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Endpoint URL (e.g. "ws://localhost:8000")
    pub endpoint: String,
    /// Root username
    pub username: Option<String>,
    /// Root password
    pub password: Option<String>,
}

impl RemoteConfig {
    /// Create from environment variables
    ///
    /// Reads:
    /// - TLC_SURREALDB_URL (required)
    /// - TLC_SURREALDB_USERNAME (optional)
    /// - TLC_SURREALDB_PASSWORD (optional)
    pub fn from_env() -> std::result::Result<Self, String> {
        let endpoint =
            std::env::var("TLC_SURREALDB_URL").map_err(|_| "TLC_SURREALDB_URL not set")?;
        Ok(Self {
            endpoint,
            username: std::env::var("TLC_SURREALDB_USERNAME").ok(),
            password: std::env::var("TLC_SURREALDB_PASSWORD").ok(),
        })
    }
}

/// Shared SurrealDB connection with the TLC schema applied
#[derive(Clone)]
pub struct SurrealHandle {
    db: Surreal<Any>,
}

impl SurrealHandle {
    /// Connect to an in-memory database and set up schema
    #[instrument(skip_all)]
    pub async fn in_memory() -> Result<Self> {
        info!("Connecting to SurrealDB (in-memory)");
        Self::connect("mem://").await
    }

    /// Open (or create) a file-backed database under `dir`
    #[instrument(skip_all, fields(dir = %dir.display()))]
    pub async fn open_local(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        let url = format!("surrealkv://{}", dir.display());
        info!("Using local persistence: {}", url);
        Self::connect(&url).await
    }

    /// Connect to a remote instance, signing in as root when credentials are set
    #[instrument(skip(config), fields(endpoint = %config.endpoint))]
    pub async fn open_remote(config: RemoteConfig) -> Result<Self> {
        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            db.signin(Root {
                username: username.as_str(),
                password: password.as_str(),
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root authentication failed: {}", e)))?;
        }

        Self::select_and_migrate(db).await
    }

    /// Connect using the environment, falling back to local persistence
    ///
    /// If TLC_SURREALDB_URL is set, connects there; otherwise opens
    /// `default_dir` with the file-backed engine.
    pub async fn setup_from_env(default_dir: &Path) -> Result<Self> {
        if let Ok(config) = RemoteConfig::from_env() {
            info!("TLC_SURREALDB_URL found, connecting to {}", config.endpoint);
            return Self::open_remote(config).await;
        }
        Self::open_local(default_dir).await
    }

    /// Connect to any supported URL scheme
    pub async fn connect(url: &str) -> Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;
        Self::select_and_migrate(db).await
    }

    async fn select_and_migrate(db: Surreal<Any>) -> Result<Self> {
        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        Ok(Self { db })
    }

    /// Underlying client
    pub fn db(&self) -> &Surreal<Any> {
        &self.db
    }
}
