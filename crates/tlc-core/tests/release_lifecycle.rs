//! End-to-end release lifecycle through the manager and the service boundary.

use std::sync::Arc;

use serde_json::json;
use tlc_core::audit::AuditLedger;
use tlc_core::fakes::{RecordingNotifier, Scripted, ScriptedGateRunner};
use tlc_core::policy::{load, NotificationEvent, RawConfig, ReleaseConfig};
use tlc_core::{
    Actor, GateName, ManagerOptions, PipelineError, ReleaseManager, ReleaseService, ReleaseState,
    Role,
};
use tlc_state::fakes::{MemoryAuditStore, MemoryReleaseStore};
use tlc_state::{AuditStore, ReleaseStore};

struct Harness {
    manager: Arc<ReleaseManager>,
    service: ReleaseService,
    runner: Arc<ScriptedGateRunner>,
    notifier: Arc<RecordingNotifier>,
    audit: Arc<MemoryAuditStore>,
    releases: Arc<MemoryReleaseStore>,
}

fn config() -> ReleaseConfig {
    let raw: RawConfig = serde_json::from_value(json!({
        "previewDomain": "preview.example.com",
        "notifications": {
            "onDeploy": ["slack:#previews"],
            "onAccept": ["slack:#releases"],
            "onReject": ["slack:#releases"],
            "onPromote": ["slack:#releases", "email:release-team@example.com"],
            "onGatesFailed": ["slack:#ci"]
        }
    }))
    .unwrap();
    load(raw).unwrap()
}

fn harness_with(config: ReleaseConfig, options: ManagerOptions) -> Harness {
    let audit = Arc::new(MemoryAuditStore::new());
    let releases = Arc::new(MemoryReleaseStore::new());
    let runner = Arc::new(ScriptedGateRunner::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let ledger = Arc::new(AuditLedger::new(audit.clone()));
    let manager = Arc::new(
        ReleaseManager::new(Arc::new(config), releases.clone(), ledger, runner.clone())
            .with_notifier(notifier.clone())
            .with_options(options),
    );
    let service = ReleaseService::new(manager.clone());
    Harness {
        manager,
        service,
        runner,
        notifier,
        audit,
        releases,
    }
}

fn harness() -> Harness {
    harness_with(config(), ManagerOptions::default())
}

fn ci() -> Actor {
    Actor::new("ci-bot", Role::Developer)
}

fn qa() -> Actor {
    Actor::new("quinn", Role::Qa)
}

fn developer() -> Actor {
    Actor::new("dev-dana", Role::Developer)
}

async fn events(h: &Harness, tag: &str) -> Vec<String> {
    h.audit
        .entries_for_tag(tag)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event)
        .collect()
}

async fn state(h: &Harness, tag: &str) -> ReleaseState {
    h.manager.get_release(tag).await.unwrap().unwrap().state
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rc_release_end_to_end() {
    let h = harness();
    let tag = "v1.0.0-rc.1";
    h.runner.fail_once(GateName::Security, "2 high severity advisories");

    let started = h.service.start(&ci(), tag, "9fceb02", false).await;
    assert!(started.success, "{}", started.message);
    assert_eq!(started.data.as_ref().unwrap()["state"], "pending");

    let gated = h.service.run_gates(&ci(), tag).await;
    assert!(gated.success, "{}", gated.message);
    let data = gated.data.unwrap();
    assert_eq!(data["state"], "gates-failed");
    assert_eq!(data["gateResults"]["passed"], false);
    assert_eq!(data["gateResults"]["results"].as_array().unwrap().len(), 3);

    let retried = h.service.retry(&ci(), tag).await;
    assert!(retried.success, "{}", retried.message);
    let data = retried.data.unwrap();
    assert_eq!(data["state"], "deployed");
    assert_eq!(data["previewUrl"], "https://v1.0.0-rc.1.preview.example.com");
    assert_eq!(data["gateResults"]["passed"], true);

    let accepted = h.service.accept(&qa(), tag).await;
    assert!(accepted.success, "{}", accepted.message);
    assert_eq!(accepted.data.unwrap()["reviewer"], "quinn");

    let promoted = h.service.promote(&qa(), tag).await;
    assert!(promoted.success, "{}", promoted.message);
    let data = promoted.data.unwrap();
    assert_eq!(data["promotedTag"], "v1.0.0");
    assert_eq!(data["deploymentStrategy"], "canary");
    assert_eq!(data["requires2fa"], true);

    let release = h.manager.get_release(tag).await.unwrap().unwrap();
    assert_eq!(release.state, ReleaseState::Promoted);
    assert_eq!(release.promoted_tag.as_deref(), Some("v1.0.0"));

    assert_eq!(
        h.runner.gates_run(),
        vec![
            GateName::Tests,
            GateName::Security,
            GateName::Coverage,
            GateName::Security
        ],
        "retry re-runs only the failing gate"
    );
    assert_eq!(
        events(&h, tag).await,
        vec![
            "created",
            "gates-failed",
            "gates-retried",
            "gates-passed",
            "deployed",
            "accepted",
            "promoted"
        ]
    );
    assert!(h.manager.ledger().verify_integrity().await.unwrap().valid);
}

#[tokio::test]
async fn notifications_follow_configured_channels() {
    let h = harness();
    let tag = "v2.0.0-rc.1";
    h.runner.fail_once(GateName::Coverage, "82 < 85");

    h.manager.start_release(tag, "abc", "ci").await.unwrap();
    h.manager.run_gates(tag, "ci").await.unwrap();
    h.manager.retry_gates(tag, "ci").await.unwrap();
    h.manager.accept_release(tag, "quinn").await.unwrap();
    h.manager.promote(tag, "quinn").await.unwrap();

    let sent: Vec<(String, NotificationEvent)> = h
        .notifier
        .sent()
        .into_iter()
        .map(|(channel, n)| (channel, n.event))
        .collect();
    assert_eq!(
        sent,
        vec![
            ("slack:#ci".to_string(), NotificationEvent::OnGatesFailed),
            ("slack:#previews".to_string(), NotificationEvent::OnDeploy),
            ("slack:#releases".to_string(), NotificationEvent::OnAccept),
            ("slack:#releases".to_string(), NotificationEvent::OnPromote),
            (
                "email:release-team@example.com".to_string(),
                NotificationEvent::OnPromote
            ),
        ]
    );
}

#[tokio::test]
async fn notification_failure_does_not_fail_operation() {
    let h = harness();
    h.notifier.fail_deliveries(true);
    h.manager.start_release("v1.1.0-beta.1", "abc", "ci").await.unwrap();
    let release = h.manager.run_gates("v1.1.0-beta.1", "ci").await.unwrap();
    assert_eq!(release.state, ReleaseState::Deployed);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn manual_preview_when_auto_preview_disabled() {
    let h = harness_with(config(), ManagerOptions { auto_preview: false });
    let tag = "v1.2.0-dev.4";
    h.manager.start_release(tag, "abc", "ci").await.unwrap();

    let release = h.manager.run_gates(tag, "ci").await.unwrap();
    assert_eq!(release.state, ReleaseState::GatesPassed);
    assert_eq!(
        h.runner.gates_run(),
        vec![GateName::Tests, GateName::Coverage]
    );

    let url = h.manager.deploy_preview(tag, "ci").await.unwrap();
    assert_eq!(url, "https://v1.2.0-dev.4.preview.example.com");
    assert_eq!(state(&h, tag).await, ReleaseState::Deployed);

    let again = h.manager.deploy_preview(tag, "ci").await.unwrap_err();
    assert_eq!(again.kind(), "state");
}

#[tokio::test]
async fn accept_straight_from_gates_passed() {
    let h = harness_with(config(), ManagerOptions { auto_preview: false });
    let tag = "v3.0.0-rc.2";
    h.manager.start_release(tag, "abc", "ci").await.unwrap();
    h.manager.run_gates(tag, "ci").await.unwrap();
    let release = h.manager.accept_release(tag, "quinn").await.unwrap();
    assert_eq!(release.state, ReleaseState::Accepted);
}

// ---------------------------------------------------------------------------
// Reported failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_tag_creates_nothing() {
    let h = harness();
    for tag in ["1.0.0", "v1.0", "v1.0.0-alpha.1", "latest"] {
        let result = h.service.start(&ci(), tag, "abc", false).await;
        assert!(!result.success, "{tag}");
        assert_eq!(result.error_kind, Some("format"), "{tag}");
    }
    assert!(h.releases.list().await.unwrap().is_empty());
    assert!(h.audit.entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn tag_pattern_is_enforced() {
    let raw: RawConfig = serde_json::from_value(json!({ "tagPattern": "v2.*" })).unwrap();
    let h = harness_with(load(raw).unwrap(), ManagerOptions::default());

    let err = h
        .manager
        .start_release("v1.0.0-rc.1", "abc", "ci")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Format(_)));
    assert!(h.manager.start_release("v2.0.0-rc.1", "abc", "ci").await.is_ok());
}

#[tokio::test]
async fn empty_commit_is_rejected() {
    let h = harness();
    let err = h
        .manager
        .start_release("v1.0.0-rc.1", "  ", "ci")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "format");
}

#[tokio::test]
async fn duplicate_start_is_state_error() {
    let h = harness();
    h.manager.start_release("v1.0.0-rc.1", "abc", "ci").await.unwrap();
    let err = h
        .manager
        .start_release("v1.0.0-rc.1", "def", "ci")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "state");
    assert_eq!(events(&h, "v1.0.0-rc.1").await, vec!["created"]);
}

#[tokio::test]
async fn unknown_tag_is_not_found() {
    let h = harness();
    let result = h.service.get(&ci(), "v9.9.9").await;
    assert_eq!(result.error_kind, Some("not-found"));
    let err = h.manager.run_gates("v9.9.9", "ci").await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound { .. }));
}

#[tokio::test]
async fn reject_requires_reason() {
    let h = harness();
    let tag = "v1.0.0-rc.1";
    h.manager.start_release(tag, "abc", "ci").await.unwrap();
    h.manager.run_gates(tag, "ci").await.unwrap();

    for reason in ["", "   "] {
        let result = h.service.reject(&qa(), tag, reason).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some("reason-required"));
    }
    assert_eq!(state(&h, tag).await, ReleaseState::Deployed);

    let rejected = h
        .manager
        .reject_release(tag, "quinn", "login flow broken on Safari")
        .await
        .unwrap();
    assert_eq!(rejected.state, ReleaseState::Rejected);
    assert_eq!(
        rejected.rejection_reason.as_deref(),
        Some("login flow broken on Safari")
    );

    let trail = h.manager.ledger().get_audit_trail(tag).await.unwrap();
    let last = trail.last().unwrap();
    assert_eq!(last.event, "rejected");
    assert_eq!(last.metadata["reason"], "login flow broken on Safari");
}

#[tokio::test]
async fn rejected_is_terminal() {
    let h = harness();
    let tag = "v1.0.0-rc.1";
    h.manager.start_release(tag, "abc", "ci").await.unwrap();
    h.runner.fail_once(GateName::Tests, "3 failures");
    h.manager.run_gates(tag, "ci").await.unwrap();
    h.manager.reject_release(tag, "quinn", "abandoned").await.unwrap();

    assert_eq!(h.manager.retry_gates(tag, "ci").await.unwrap_err().kind(), "state");
    assert_eq!(h.manager.accept_release(tag, "quinn").await.unwrap_err().kind(), "state");
    assert_eq!(h.manager.promote(tag, "quinn").await.unwrap_err().kind(), "state");
}

#[tokio::test]
async fn retry_only_from_gates_failed() {
    let h = harness();
    let tag = "v1.0.0-beta.3";
    h.manager.start_release(tag, "abc", "ci").await.unwrap();
    assert_eq!(h.manager.retry_gates(tag, "ci").await.unwrap_err().kind(), "state");

    h.runner.script(
        GateName::Coverage,
        [
            Scripted::Fail("74 < 80".to_string()),
            Scripted::Fail("78 < 80".to_string()),
        ],
    );
    let failed = h.manager.run_gates(tag, "ci").await.unwrap();
    assert_eq!(failed.state, ReleaseState::GatesFailed);

    let still_failed = h.manager.retry_gates(tag, "ci").await.unwrap();
    assert_eq!(still_failed.state, ReleaseState::GatesFailed);
    let results = still_failed.gate_results.unwrap();
    assert_eq!(results.failing_gates(), vec![GateName::Coverage]);

    let passed = h.manager.retry_gates(tag, "ci").await.unwrap();
    assert_ne!(passed.state, ReleaseState::GatesFailed);
    assert!(passed.gate_results.unwrap().passed);
}

#[tokio::test]
async fn promote_requires_accepted_rc() {
    let h = harness();

    let beta = "v1.0.0-beta.1";
    h.manager.start_release(beta, "abc", "ci").await.unwrap();
    h.manager.run_gates(beta, "ci").await.unwrap();
    h.manager.accept_release(beta, "quinn").await.unwrap();
    let err = h.manager.promote(beta, "quinn").await.unwrap_err();
    assert_eq!(err.kind(), "state");
    assert_eq!(state(&h, beta).await, ReleaseState::Accepted);

    let rc = "v1.0.0-rc.1";
    h.manager.start_release(rc, "abc", "ci").await.unwrap();
    h.manager.run_gates(rc, "ci").await.unwrap();
    let err = h.manager.promote(rc, "quinn").await.unwrap_err();
    assert_eq!(err.kind(), "state");
    assert_eq!(state(&h, rc).await, ReleaseState::Deployed);
}

// ---------------------------------------------------------------------------
// Gate runner failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn runner_timeout_counts_as_failed_gate() {
    let h = harness();
    let tag = "v1.0.0-feature.7";
    h.runner.script(GateName::Tests, [Scripted::TimeOut]);
    h.manager.start_release(tag, "abc", "ci").await.unwrap();

    let release = h.manager.run_gates(tag, "ci").await.unwrap();
    assert_eq!(release.state, ReleaseState::GatesFailed);
    let results = release.gate_results.unwrap();
    assert!(results.results[0].detail.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn runner_error_restores_state_and_propagates() {
    let h = harness();
    let tag = "v1.0.0-rc.1";
    h.runner
        .script(GateName::Security, [Scripted::Error("scanner offline".to_string())]);
    h.manager.start_release(tag, "abc", "ci").await.unwrap();

    let err = h.manager.run_gates(tag, "ci").await.unwrap_err();
    assert!(matches!(err, PipelineError::Upstream(ref m) if m.contains("scanner offline")));
    assert_eq!(state(&h, tag).await, ReleaseState::Pending);
    assert_eq!(events(&h, tag).await, vec!["created"]);

    let release = h.manager.run_gates(tag, "ci").await.unwrap();
    assert_eq!(release.state, ReleaseState::Deployed);
}

#[tokio::test]
async fn ledger_failure_propagates() {
    let h = harness();
    let tag = "v1.0.0-rc.1";
    h.audit.fail_appends(true);
    let err = h.manager.start_release(tag, "abc", "ci").await.unwrap_err();
    assert_eq!(err.kind(), "storage");
    assert!(h.manager.get_release(tag).await.unwrap().is_none());
    assert!(h.releases.list().await.unwrap().is_empty());

    h.audit.fail_appends(false);
    let release = h.manager.start_release(tag, "abc", "ci").await.unwrap();
    assert_eq!(release.state, ReleaseState::Pending);
    assert_eq!(events(&h, tag).await, vec!["created"]);
}

#[tokio::test]
async fn ledger_failure_during_retry_keeps_gates_failed() {
    let h = harness();
    let tag = "v1.0.0-rc.1";
    h.runner.fail_once(GateName::Security, "2 high severity advisories");
    h.manager.start_release(tag, "abc", "ci").await.unwrap();
    h.manager.run_gates(tag, "ci").await.unwrap();

    h.audit.fail_appends(true);
    let err = h.manager.retry_gates(tag, "ci").await.unwrap_err();
    assert_eq!(err.kind(), "storage");
    h.audit.fail_appends(false);

    let release = h.manager.get_release(tag).await.unwrap().unwrap();
    assert_eq!(release.state, ReleaseState::GatesFailed);
    assert_eq!(
        release.gate_results.unwrap().failing_gates(),
        vec![GateName::Security]
    );
    assert_eq!(events(&h, tag).await, vec!["created", "gates-failed"]);

    let retried = h.manager.retry_gates(tag, "ci").await.unwrap();
    assert_eq!(retried.state, ReleaseState::Deployed);
    assert_eq!(
        events(&h, tag).await,
        vec!["created", "gates-failed", "gates-retried", "gates-passed", "deployed"]
    );
}

#[tokio::test]
async fn ledger_failure_after_gate_run_returns_to_pending() {
    let h = harness();
    let tag = "v1.0.0-beta.1";
    h.manager.start_release(tag, "abc", "ci").await.unwrap();

    h.audit.fail_appends(true);
    let err = h.manager.run_gates(tag, "ci").await.unwrap_err();
    assert_eq!(err.kind(), "storage");
    h.audit.fail_appends(false);

    let release = h.manager.get_release(tag).await.unwrap().unwrap();
    assert_eq!(release.state, ReleaseState::Pending);
    assert!(release.gate_results.is_none());

    let release = h.manager.run_gates(tag, "ci").await.unwrap();
    assert_eq!(release.state, ReleaseState::Deployed);
}

#[tokio::test]
async fn ledger_failure_on_decision_leaves_release_undecided() {
    let h = harness();
    let tag = "v1.0.0-rc.1";
    h.manager.start_release(tag, "abc", "ci").await.unwrap();
    h.manager.run_gates(tag, "ci").await.unwrap();

    h.audit.fail_appends(true);
    assert!(h.manager.accept_release(tag, "quinn").await.is_err());
    h.audit.fail_appends(false);

    let release = h.manager.get_release(tag).await.unwrap().unwrap();
    assert_eq!(release.state, ReleaseState::Deployed);
    assert!(release.reviewer.is_none());

    let rejected = h.manager.reject_release(tag, "quinn", "flaky").await.unwrap();
    assert_eq!(rejected.state, ReleaseState::Rejected);
    assert_eq!(
        events(&h, tag).await,
        vec!["created", "gates-passed", "deployed", "rejected"]
    );
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

async fn assert_developer_denied(h: &Harness, tag: &str) {
    let accept = h.service.accept(&developer(), tag).await;
    assert!(!accept.success);
    assert_eq!(accept.error_kind, Some("authorization"));

    let reject = h.service.reject(&developer(), tag, "looks wrong").await;
    assert!(!reject.success);
    assert_eq!(reject.error_kind, Some("authorization"));
}

#[tokio::test]
async fn developer_is_denied_at_every_step() {
    let h = harness();
    let tag = "v1.0.0-rc.1";
    h.runner.fail_once(GateName::Tests, "1 failure");

    h.service.start(&ci(), tag, "abc", false).await;
    assert_developer_denied(&h, tag).await;
    assert_eq!(state(&h, tag).await, ReleaseState::Pending);

    h.service.run_gates(&ci(), tag).await;
    assert_developer_denied(&h, tag).await;
    assert_eq!(state(&h, tag).await, ReleaseState::GatesFailed);

    h.service.retry(&ci(), tag).await;
    assert_developer_denied(&h, tag).await;
    assert_eq!(state(&h, tag).await, ReleaseState::Deployed);

    assert!(h.service.accept(&qa(), tag).await.success);
    assert_developer_denied(&h, tag).await;
    assert_eq!(state(&h, tag).await, ReleaseState::Accepted);

    let denials: Vec<_> = h
        .manager
        .ledger()
        .get_audit_trail(tag)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.event == "access-denied")
        .collect();
    assert_eq!(denials.len(), 8);
    assert!(denials.iter().all(|e| e.user == "dev-dana"));
    assert_eq!(denials[0].metadata["role"], "developer");
}

#[tokio::test]
async fn denial_for_malformed_tag_is_not_audited() {
    let h = harness();

    let denied = h.service.accept(&developer(), "../../etc/passwd").await;
    assert!(!denied.success);
    assert_eq!(denied.error_kind, Some("authorization"));
    assert!(h.audit.entries().await.unwrap().is_empty());

    h.service.accept(&developer(), "v9.9.9").await;
    assert_eq!(events(&h, "v9.9.9").await, vec!["access-denied"]);
}

#[tokio::test]
async fn admin_may_decide() {
    let h = harness();
    let tag = "v1.0.0-rc.1";
    h.manager.start_release(tag, "abc", "ci").await.unwrap();
    h.manager.run_gates(tag, "ci").await.unwrap();

    let admin = Actor::new("root", Role::Admin);
    assert!(h.service.reject(&admin, tag, "superseded by rc.2").await.success);
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_releases_newest_first() {
    let h = harness();
    for tag in ["v1.0.0-rc.1", "v2.0.0-rc.1", "v1.1.0-rc.1"] {
        h.manager.start_release(tag, "abc", "ci").await.unwrap();
    }
    let tags: Vec<String> = h
        .manager
        .list_releases()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.tag)
        .collect();
    assert_eq!(tags, vec!["v2.0.0-rc.1", "v1.1.0-rc.1", "v1.0.0-rc.1"]);

    let listed = h.service.list(&ci()).await;
    assert_eq!(listed.data.unwrap().as_array().unwrap().len(), 3);
}
