//! TLC Core Library
//!
//! The release gating pipeline: tag classification, tier policy
//! resolution, the hash-chained audit ledger and the release state machine.
//!
//! ## Key Components
//!
//! - `domain`: tags, tiers, gates and the `Release` state machine
//! - `policy`: configuration validation and per-tier policy resolution
//! - `audit`: append-only ledger with integrity checks and exports
//! - `manager`: `ReleaseManager`, the per-tag release workflow
//! - `service`: role-checked boundary returning `OperationResult`

pub mod audit;
pub mod authz;
pub mod domain;
pub mod fakes;
pub mod gate_runner;
pub mod git;
pub mod manager;
pub mod metrics;
pub mod notify;
pub mod obs;
pub mod policy;
pub mod service;
pub mod telemetry;

pub use audit::{
    AuditEvent, AuditLedger, AuditQuery, ExportFormat, ExportOptions, IntegrityReport,
    TagSummary,
};
pub use authz::{AccessPolicy, AccessRule, Action, AuthzDecision, Role};
pub use domain::{
    compare_versions, is_valid_tag, GateName, GateResult, GateResults, GateStatus, ParsedTag,
    PipelineError, Release, ReleaseState, Result, Tier,
};
pub use gate_runner::{GateRunner, GateRunnerError};
pub use git::{capture_head_sha, resolve_commit_for_tag};
pub use manager::{ManagerOptions, Promotion, ReleaseManager};
pub use notify::{Notification, Notifier, TracingNotifier};
pub use policy::{
    get_gates_for_tier, get_preview_url, load, validate, DeploymentStrategy, GateCommandSpec,
    NotificationEvent, RawConfig, ReleaseConfig, TierPolicy, ValidationReport,
};
pub use service::{Actor, OperationResult, ReleaseService};
pub use telemetry::init_tracing;

pub use tlc_state::{AuditEntry, AuditStore, ReleaseStore, StorageError};
