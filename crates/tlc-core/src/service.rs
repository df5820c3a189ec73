//! Caller-facing boundary: role checks plus a uniform result envelope.
//!
//! Every operation returns an [`OperationResult`] instead of an error, so
//! adapters (CLI, HTTP) render success and failure the same way. Denied
//! calls are recorded in the ledger as `access-denied` against the tag when
//! the tag is well formed; denials naming anything else are only logged.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::audit::{AuditEvent, AuditLedger, AuditQuery, ExportOptions};
use crate::authz::{AccessPolicy, Action, AuthzDecision, Role};
use crate::domain::{is_valid_tag, PipelineError, Result};
use crate::manager::ReleaseManager;
use crate::metrics::METRICS;
use crate::obs;

/// Who is calling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub user: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user: impl Into<String>, role: Role) -> Self {
        Self {
            user: user.into(),
            role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error_kind: None,
        }
    }

    pub fn failed(error: &PipelineError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            data: None,
            error_kind: Some(error.kind()),
        }
    }
}

fn respond<T: Serialize>(result: Result<T>, message: impl FnOnce(&T) -> String) -> OperationResult {
    match result {
        Ok(value) => {
            let message = message(&value);
            match serde_json::to_value(&value) {
                Ok(data) => OperationResult::ok(message, data),
                Err(e) => OperationResult::failed(&e.into()),
            }
        }
        Err(e) => OperationResult::failed(&e),
    }
}

pub struct ReleaseService {
    manager: Arc<ReleaseManager>,
    access: AccessPolicy,
}

impl ReleaseService {
    pub fn new(manager: Arc<ReleaseManager>) -> Self {
        Self {
            manager,
            access: AccessPolicy::standard(),
        }
    }

    pub fn with_access_policy(mut self, access: AccessPolicy) -> Self {
        self.access = access;
        self
    }

    fn ledger(&self) -> &AuditLedger {
        self.manager.ledger()
    }

    /// Check the table; on denial, audit the attempt against `tag`.
    async fn authorize(&self, actor: &Actor, action: Action, tag: Option<&str>) -> Result<()> {
        let AuthzDecision::Denied { reason } = self.access.authorize(&actor.role, action) else {
            return Ok(());
        };

        METRICS.inc_access_denials();
        if let Some(tag) = tag {
            obs::emit_access_denied(tag, &actor.user, actor.role.as_str(), action.as_str());
        }
        if let Some(tag) = tag.filter(|tag| is_valid_tag(tag)) {
            self.ledger()
                .record_event(
                    tag,
                    AuditEvent::new("access-denied", actor.user.as_str())
                        .with_detail("action", action.as_str())
                        .with_detail("role", actor.role.as_str())
                        .with_detail("reason", reason),
                )
                .await?;
        }
        Err(PipelineError::Authorization {
            role: actor.role.to_string(),
            action: action.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Release operations
    // -----------------------------------------------------------------------

    pub async fn start(
        &self,
        actor: &Actor,
        tag: &str,
        commit: &str,
        run_gates: bool,
    ) -> OperationResult {
        let result = async {
            self.authorize(actor, Action::StartRelease, Some(tag)).await?;
            let release = self.manager.start_release(tag, commit, &actor.user).await?;
            if run_gates {
                return self.manager.run_gates(tag, &actor.user).await;
            }
            Ok(release)
        }
        .await;
        respond(result, |r| format!("{} is {}", r.tag, r.state))
    }

    pub async fn run_gates(&self, actor: &Actor, tag: &str) -> OperationResult {
        let result = async {
            self.authorize(actor, Action::RetryGates, Some(tag)).await?;
            self.manager.run_gates(tag, &actor.user).await
        }
        .await;
        respond(result, |r| format!("{} is {}", r.tag, r.state))
    }

    pub async fn get(&self, actor: &Actor, tag: &str) -> OperationResult {
        let result = async {
            self.authorize(actor, Action::ViewRelease, Some(tag)).await?;
            self.manager
                .get_release(tag)
                .await?
                .ok_or_else(|| PipelineError::NotFound {
                    tag: tag.to_string(),
                })
        }
        .await;
        respond(result, |r| format!("{} is {}", r.tag, r.state))
    }

    pub async fn list(&self, actor: &Actor) -> OperationResult {
        let result = async {
            self.authorize(actor, Action::ViewRelease, None).await?;
            self.manager.list_releases().await
        }
        .await;
        respond(result, |releases| format!("{} releases", releases.len()))
    }

    pub async fn deploy(&self, actor: &Actor, tag: &str) -> OperationResult {
        let result = async {
            self.authorize(actor, Action::DeployPreview, Some(tag)).await?;
            let url = self.manager.deploy_preview(tag, &actor.user).await?;
            Ok::<_, PipelineError>(json!({ "tag": tag, "previewUrl": url }))
        }
        .await;
        respond(result, |data| {
            format!(
                "preview deployed at {}",
                data["previewUrl"].as_str().unwrap_or_default()
            )
        })
    }

    pub async fn accept(&self, actor: &Actor, tag: &str) -> OperationResult {
        let result = async {
            self.authorize(actor, Action::AcceptRelease, Some(tag)).await?;
            self.manager.accept_release(tag, &actor.user).await
        }
        .await;
        respond(result, |r| format!("{} accepted", r.tag))
    }

    pub async fn reject(&self, actor: &Actor, tag: &str, reason: &str) -> OperationResult {
        let result = async {
            self.authorize(actor, Action::RejectRelease, Some(tag)).await?;
            self.manager.reject_release(tag, &actor.user, reason).await
        }
        .await;
        respond(result, |r| format!("{} rejected", r.tag))
    }

    pub async fn retry(&self, actor: &Actor, tag: &str) -> OperationResult {
        let result = async {
            self.authorize(actor, Action::RetryGates, Some(tag)).await?;
            self.manager.retry_gates(tag, &actor.user).await
        }
        .await;
        respond(result, |r| format!("{} is {}", r.tag, r.state))
    }

    pub async fn promote(&self, actor: &Actor, tag: &str) -> OperationResult {
        let result = async {
            self.authorize(actor, Action::PromoteRelease, Some(tag)).await?;
            self.manager.promote(tag, &actor.user).await
        }
        .await;
        respond(result, |p| format!("{} promoted to {}", p.tag, p.promoted_tag))
    }

    // -----------------------------------------------------------------------
    // Audit operations
    // -----------------------------------------------------------------------

    pub async fn trail(&self, actor: &Actor, tag: &str) -> OperationResult {
        let result = async {
            self.authorize(actor, Action::ViewAudit, Some(tag)).await?;
            self.ledger().get_audit_trail(tag).await
        }
        .await;
        respond(result, |entries| format!("{} entries for {tag}", entries.len()))
    }

    pub async fn summary(&self, actor: &Actor) -> OperationResult {
        let result = async {
            self.authorize(actor, Action::ViewAudit, None).await?;
            self.ledger().get_summary().await
        }
        .await;
        respond(result, |rows| format!("{} tags", rows.len()))
    }

    pub async fn query(&self, actor: &Actor, query: &AuditQuery) -> OperationResult {
        let result = async {
            self.authorize(actor, Action::ViewAudit, None).await?;
            self.ledger().query(query).await
        }
        .await;
        respond(result, |entries| format!("{} matching entries", entries.len()))
    }

    pub async fn verify(&self, actor: &Actor) -> OperationResult {
        let result = async {
            self.authorize(actor, Action::VerifyAudit, None).await?;
            self.ledger().verify_integrity().await
        }
        .await;
        match result {
            Ok(report) if !report.valid => {
                let error = PipelineError::Integrity {
                    tampered: report.tampered_entries.len(),
                };
                OperationResult {
                    data: serde_json::to_value(&report).ok(),
                    ..OperationResult::failed(&error)
                }
            }
            other => respond(other, |report| {
                format!("audit ledger intact ({} entries)", report.total_entries)
            }),
        }
    }

    pub async fn export(&self, actor: &Actor, options: &ExportOptions) -> OperationResult {
        let result = async {
            self.authorize(actor, Action::ExportAudit, None).await?;
            self.ledger().export(options).await
        }
        .await;
        respond(result, |_| format!("exported audit ledger as {}", options.format))
    }
}
