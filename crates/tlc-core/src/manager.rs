//! Release manager: the per-tag release state machine.
//!
//! Every mutating operation holds its tag's lock for its whole duration, so
//! operations on one tag are serialized while different tags proceed
//! concurrently. Each successful transition is persisted and then recorded
//! as one audit entry. Reported failures (format, not-found, state,
//! reason-required) leave both the release and the ledger untouched, and a
//! transition whose audit entry cannot be written is rolled back.
//!
//! The tag lock only serializes callers sharing one manager. Saves are
//! compare-and-set against the revision the release was loaded at, so a
//! second process acting on the same tag through a shared store gets a
//! state error instead of overwriting the first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tlc_state::{ReleaseDocument, ReleaseStore, StorageError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::audit::{AuditEvent, AuditLedger};
use crate::domain::{
    matches_pattern, GateName, GateResult, GateResults, ParsedTag, PipelineError, Release,
    ReleaseState, Result, Tier,
};
use crate::gate_runner::{GateRunner, GateRunnerError};
use crate::metrics::METRICS;
use crate::notify::{Notification, Notifier, TracingNotifier};
use crate::obs::{self, ReleaseSpan};
use crate::policy::{get_preview_url, DeploymentStrategy, NotificationEvent, ReleaseConfig, TierPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Deploy a preview as soon as gates pass.
    pub auto_preview: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self { auto_preview: true }
    }
}

/// Outcome of a successful promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    pub tag: String,
    pub promoted_tag: String,
    pub deployment_strategy: DeploymentStrategy,
    pub requires_2fa: bool,
}

/// A release together with the store revision it was read at.
struct Loaded {
    release: Release,
    revision: u64,
}

/// Holds a tag's lock and drops the tag's map entry once no caller wants it.
struct TagGuard<'a> {
    locks: &'a TagLocks,
    tag: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TagGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.tag)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.tag);
        }
    }
}

type TagLocks = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

pub struct ReleaseManager {
    config: Arc<ReleaseConfig>,
    releases: Arc<dyn ReleaseStore>,
    ledger: Arc<AuditLedger>,
    gates: Arc<dyn GateRunner>,
    notifier: Arc<dyn Notifier>,
    options: ManagerOptions,
    tag_locks: TagLocks,
}

impl ReleaseManager {
    pub fn new(
        config: Arc<ReleaseConfig>,
        releases: Arc<dyn ReleaseStore>,
        ledger: Arc<AuditLedger>,
        gates: Arc<dyn GateRunner>,
    ) -> Self {
        Self {
            config,
            releases,
            ledger,
            gates,
            notifier: Arc::new(TracingNotifier),
            options: ManagerOptions::default(),
            tag_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_options(mut self, options: ManagerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &ReleaseConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<AuditLedger> {
        &self.ledger
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Register a new release in `pending`.
    pub async fn start_release(&self, tag: &str, commit: &str, user: &str) -> Result<Release> {
        let _span = ReleaseSpan::enter(tag, "start_release");

        let parsed = ParsedTag::parse(tag)?;
        if !matches_pattern(tag, &self.config.tag_pattern)? {
            return Err(PipelineError::Format(format!(
                "tag '{tag}' does not match the configured pattern '{}'",
                self.config.tag_pattern
            )));
        }
        let commit = commit.trim();
        if commit.is_empty() {
            return Err(PipelineError::Format(format!(
                "a commit is required to start {tag}"
            )));
        }
        self.policy_for(parsed.tier())?;

        let _guard = self.lock_tag(tag).await;
        if self.releases.get(tag).await?.is_some() {
            return Err(PipelineError::state(tag, "release already exists"));
        }

        let release = Release::new(&parsed, commit);
        let doc = ReleaseDocument::new(tag, serde_json::to_value(&release)?);
        match self.releases.insert(doc).await {
            Ok(()) => {}
            Err(StorageError::ReleaseExists { .. }) => {
                return Err(PipelineError::state(tag, "release already exists"));
            }
            Err(e) => return Err(e.into()),
        }

        let created = AuditEvent::new("created", user)
            .with_detail("commit", commit)
            .with_detail("tier", release.tier.as_str());
        if let Err(e) = self.ledger.record_event(tag, created).await {
            if let Err(undo) = self.releases.remove(tag).await {
                warn!(tag, error = %undo, "failed to remove unaudited release");
            }
            return Err(e);
        }

        METRICS.inc_releases_started();
        obs::emit_release_started(tag, release.tier.as_str(), commit);
        Ok(release)
    }

    /// Run every automated gate for a `pending` release.
    pub async fn run_gates(&self, tag: &str, user: &str) -> Result<Release> {
        let _span = ReleaseSpan::enter(tag, "run_gates");
        let _guard = self.lock_tag(tag).await;

        let mut loaded = self.load(tag).await?;
        if loaded.release.state != ReleaseState::Pending {
            return Err(PipelineError::state(
                tag,
                format!("gates can only be started from pending, not {}", loaded.release.state),
            ));
        }
        let gates = self.policy_for(loaded.release.tier)?.automated_gates();
        let original = loaded.release.clone();

        let results = self.execute_gates(&mut loaded, &gates).await?;
        loaded.release.gate_results = Some(GateResults::from_results(results));
        self.finish_gate_run(&mut loaded, &original, user, &gates, false)
            .await?;
        Ok(loaded.release)
    }

    /// Re-run only the gates that failed last time.
    pub async fn retry_gates(&self, tag: &str, user: &str) -> Result<Release> {
        let _span = ReleaseSpan::enter(tag, "retry_gates");
        let _guard = self.lock_tag(tag).await;

        let mut loaded = self.load(tag).await?;
        if loaded.release.state != ReleaseState::GatesFailed {
            return Err(PipelineError::state(
                tag,
                format!(
                    "only releases in gates-failed can be retried, not {}",
                    loaded.release.state
                ),
            ));
        }

        let original = loaded.release.clone();
        let gates = match &original.gate_results {
            Some(results) => results.failing_gates(),
            None => self.policy_for(original.tier)?.automated_gates(),
        };

        let rerun = self.execute_gates(&mut loaded, &gates).await?;
        self.record(
            &mut loaded,
            &original,
            AuditEvent::new("gates-retried", user).with_detail("gates", gate_names(&gates)),
        )
        .await?;
        loaded.release.gate_results = Some(match original.gate_results.clone() {
            Some(results) => results.merge(rerun),
            None => GateResults::from_results(rerun),
        });
        self.finish_gate_run(&mut loaded, &original, user, &gates, true)
            .await?;
        Ok(loaded.release)
    }

    /// Deploy the preview environment for a release whose gates passed.
    pub async fn deploy_preview(&self, tag: &str, user: &str) -> Result<String> {
        let _span = ReleaseSpan::enter(tag, "deploy_preview");
        let _guard = self.lock_tag(tag).await;

        let mut loaded = self.load(tag).await?;
        self.deploy_locked(&mut loaded, user).await
    }

    /// QA sign-off. Satisfies the tier's `qa-approval` gate.
    pub async fn accept_release(&self, tag: &str, reviewer: &str) -> Result<Release> {
        let _span = ReleaseSpan::enter(tag, "accept_release");
        if reviewer.trim().is_empty() {
            return Err(PipelineError::Format("a reviewer is required".to_string()));
        }
        let _guard = self.lock_tag(tag).await;

        let mut loaded = self.load(tag).await?;
        let original = loaded.release.clone();
        let from = original.state;
        loaded.release.transition(ReleaseState::Accepted)?;
        loaded.release.reviewer = Some(reviewer.to_string());
        self.save(&mut loaded, from).await?;

        self.record(
            &mut loaded,
            &original,
            AuditEvent::new("accepted", reviewer).with_detail("previousState", from.as_str()),
        )
        .await?;
        self.notify(
            NotificationEvent::OnAccept,
            &loaded.release,
            format!("{tag} accepted by {reviewer}"),
        )
        .await;
        Ok(loaded.release)
    }

    /// QA rejection. Terminal; a non-empty reason is mandatory.
    pub async fn reject_release(&self, tag: &str, reviewer: &str, reason: &str) -> Result<Release> {
        let _span = ReleaseSpan::enter(tag, "reject_release");
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(PipelineError::ReasonRequired {
                tag: tag.to_string(),
            });
        }
        if reviewer.trim().is_empty() {
            return Err(PipelineError::Format("a reviewer is required".to_string()));
        }
        let _guard = self.lock_tag(tag).await;

        let mut loaded = self.load(tag).await?;
        let original = loaded.release.clone();
        let from = original.state;
        loaded.release.transition(ReleaseState::Rejected)?;
        loaded.release.reviewer = Some(reviewer.to_string());
        loaded.release.rejection_reason = Some(reason.to_string());
        self.save(&mut loaded, from).await?;

        self.record(
            &mut loaded,
            &original,
            AuditEvent::new("rejected", reviewer)
                .with_detail("reason", reason)
                .with_detail("previousState", from.as_str()),
        )
        .await?;
        self.notify(
            NotificationEvent::OnReject,
            &loaded.release,
            format!("{tag} rejected by {reviewer}: {reason}"),
        )
        .await;
        Ok(loaded.release)
    }

    /// Promote an accepted release candidate to its production tag.
    pub async fn promote(&self, tag: &str, user: &str) -> Result<Promotion> {
        let _span = ReleaseSpan::enter(tag, "promote");
        let _guard = self.lock_tag(tag).await;

        let mut loaded = self.load(tag).await?;
        let original = loaded.release.clone();
        if original.tier != Tier::Rc {
            return Err(PipelineError::state(
                tag,
                format!("only rc releases can be promoted, this is a {} release", original.tier),
            ));
        }
        if original.state != ReleaseState::Accepted {
            return Err(PipelineError::state(
                tag,
                format!("promotion requires an accepted release, not {}", original.state),
            ));
        }

        let promoted_tag = original.parsed_tag()?.release_tag();
        let target = self.policy_for(Tier::Release)?;
        let promotion = Promotion {
            tag: tag.to_string(),
            promoted_tag: promoted_tag.clone(),
            deployment_strategy: target.deployment_strategy,
            requires_2fa: target.requires_2fa,
        };

        let from = original.state;
        loaded.release.transition(ReleaseState::Promoted)?;
        loaded.release.promoted_tag = Some(promoted_tag.clone());
        self.save(&mut loaded, from).await?;

        self.record(
            &mut loaded,
            &original,
            AuditEvent::new("promoted", user)
                .with_detail("promotedTag", promoted_tag.as_str())
                .with_detail("deploymentStrategy", promotion.deployment_strategy.as_str()),
        )
        .await?;

        METRICS.inc_promotions();
        obs::emit_promoted(tag, &promoted_tag);
        self.notify(
            NotificationEvent::OnPromote,
            &loaded.release,
            format!("{tag} promoted to {promoted_tag}"),
        )
        .await;
        Ok(promotion)
    }

    pub async fn get_release(&self, tag: &str) -> Result<Option<Release>> {
        match self.releases.get(tag).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc.body)?)),
            None => Ok(None),
        }
    }

    /// All releases, newest version first.
    pub async fn list_releases(&self) -> Result<Vec<Release>> {
        let mut releases = Vec::new();
        for doc in self.releases.list().await? {
            let release: Release = serde_json::from_value(doc.body)?;
            let parsed = release.parsed_tag()?;
            releases.push((parsed, release));
        }
        releases.sort_by(|(a, _), (b, _)| b.cmp_precedence(a));
        Ok(releases.into_iter().map(|(_, release)| release).collect())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn lock_tag(&self, tag: &str) -> TagGuard<'_> {
        let lock = {
            let mut locks = self.tag_locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(tag.to_string()).or_default().clone()
        };
        TagGuard {
            locks: &self.tag_locks,
            tag: tag.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of tags with a live lock entry.
    #[cfg(test)]
    fn tracked_tags(&self) -> usize {
        self.tag_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn policy_for(&self, tier: Tier) -> Result<&TierPolicy> {
        self.config
            .policy(tier)
            .ok_or_else(|| PipelineError::Format(format!("no policy configured for tier {tier}")))
    }

    async fn load(&self, tag: &str) -> Result<Loaded> {
        let doc = self
            .releases
            .get(tag)
            .await?
            .ok_or_else(|| PipelineError::not_found(tag))?;
        Ok(Loaded {
            release: serde_json::from_value(doc.body)?,
            revision: doc.revision,
        })
    }

    /// Write `loaded` back at the revision it was read at.
    async fn save(&self, loaded: &mut Loaded, from: ReleaseState) -> Result<()> {
        let release = &loaded.release;
        let doc = ReleaseDocument::new(&release.tag, serde_json::to_value(release)?)
            .at_revision(loaded.revision);
        loaded.revision = match self.releases.update(doc).await {
            Ok(revision) => revision,
            Err(StorageError::ReleaseConflict { .. }) => {
                return Err(PipelineError::state(
                    &release.tag,
                    "release was modified concurrently, reload and try again",
                ));
            }
            Err(e) => return Err(e.into()),
        };
        if from != release.state {
            obs::emit_transition(&release.tag, from.as_str(), release.state.as_str());
        }
        Ok(())
    }

    /// Audit a saved transition. If the entry cannot be written the release
    /// is put back to `original` so store and ledger stay in step.
    async fn record(&self, loaded: &mut Loaded, original: &Release, event: AuditEvent) -> Result<()> {
        let tag = loaded.release.tag.clone();
        let Err(e) = self.ledger.record_event(&tag, event).await else {
            return Ok(());
        };
        let from = loaded.release.state;
        loaded.release = original.clone();
        if let Err(undo) = self.save(loaded, from).await {
            warn!(tag = %tag, error = %undo, "failed to roll back unaudited transition");
        }
        Err(e)
    }

    /// Persist `gates-running`, fan out to the runner and collect results.
    /// A runner error puts the release back where it was.
    async fn execute_gates(
        &self,
        loaded: &mut Loaded,
        gates: &[GateName],
    ) -> Result<Vec<GateResult>> {
        let from = loaded.release.state;
        loaded.release.transition(ReleaseState::GatesRunning)?;
        self.save(loaded, from).await?;

        match self.dispatch(&loaded.release, gates).await {
            Ok(results) => Ok(results),
            Err(e) => {
                loaded.release.restore(from);
                self.save(loaded, ReleaseState::GatesRunning).await?;
                Err(e)
            }
        }
    }

    async fn dispatch(&self, release: &Release, gates: &[GateName]) -> Result<Vec<GateResult>> {
        let runs = gates.iter().map(|gate| self.gates.run(*gate, release));
        let outcomes = join_all(runs).await;

        let mut results = Vec::with_capacity(gates.len());
        let mut runner_error = None;
        for (gate, outcome) in gates.iter().zip(outcomes) {
            let result = match outcome {
                Ok(result) => GateResult {
                    gate: *gate,
                    ..result
                },
                Err(e @ GateRunnerError::TimedOut { .. }) => GateResult::fail(*gate, e.to_string()),
                Err(e @ GateRunnerError::Failed { .. }) => {
                    runner_error.get_or_insert(e);
                    continue;
                }
            };
            METRICS.record_gate_run(result.passed());
            obs::emit_gate_evaluated(&release.tag, gate.as_str(), result.passed());
            results.push(result);
        }

        match runner_error {
            Some(e) => Err(PipelineError::Upstream(e.to_string())),
            None => Ok(results),
        }
    }

    /// Settle a gate run: persist the outcome, audit it, then notify or
    /// auto-deploy.
    async fn finish_gate_run(
        &self,
        loaded: &mut Loaded,
        original: &Release,
        user: &str,
        gates: &[GateName],
        retry: bool,
    ) -> Result<()> {
        let results = loaded.release.gate_results.clone().unwrap_or(GateResults {
            passed: true,
            results: Vec::new(),
        });
        let next = if results.passed {
            ReleaseState::GatesPassed
        } else {
            ReleaseState::GatesFailed
        };

        loaded.release.transition(next)?;
        self.save(loaded, ReleaseState::GatesRunning).await?;

        let failing = results.failing_gates();
        obs::emit_gates_completed(&loaded.release.tag, results.results.len(), failing.len());
        self.record(
            loaded,
            original,
            AuditEvent::new(next.as_str(), user)
                .with_detail("results", serde_json::to_value(&results.results)?)
                .with_detail("failedGates", gate_names(&failing))
                .with_detail("gatesRun", gate_names(gates))
                .with_detail("retry", retry),
        )
        .await?;

        if results.passed {
            if self.options.auto_preview {
                self.deploy_locked(loaded, user).await?;
            }
        } else {
            let message = format!(
                "gates failed for {}: {}",
                loaded.release.tag,
                failing
                    .iter()
                    .map(GateName::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            self.notify(NotificationEvent::OnGatesFailed, &loaded.release, message)
                .await;
        }
        Ok(())
    }

    async fn deploy_locked(&self, loaded: &mut Loaded, user: &str) -> Result<String> {
        let original = loaded.release.clone();
        let from = original.state;
        loaded.release.transition(ReleaseState::Deployed)?;
        let url = get_preview_url(&self.config, &original.tag, &self.config.preview_domain);
        loaded.release.preview_url = Some(url.clone());
        self.save(loaded, from).await?;

        self.record(
            loaded,
            &original,
            AuditEvent::new("deployed", user).with_detail("previewUrl", url.as_str()),
        )
        .await?;
        self.notify(
            NotificationEvent::OnDeploy,
            &loaded.release,
            format!("{} preview deployed at {url}", original.tag),
        )
        .await;
        Ok(url)
    }

    async fn notify(&self, event: NotificationEvent, release: &Release, message: String) {
        let channels = self.config.channels(event);
        if channels.is_empty() {
            debug!(tag = %release.tag, notification = %event, "no channels configured");
            return;
        }

        let notification = Notification {
            event,
            tag: release.tag.clone(),
            state: release.state,
            message,
        };
        for channel in channels {
            if let Err(e) = self.notifier.notify(channel, &notification).await {
                obs::emit_notification_failed(channel, &release.tag, &e);
            }
        }
    }
}

fn gate_names(gates: &[GateName]) -> serde_json::Value {
    json!(gates.iter().map(GateName::as_str).collect::<Vec<_>>())
}
