//! Structured observability hooks for release lifecycle events.
//!
//! - Tag-scoped tracing spans via the `ReleaseSpan` RAII guard
//! - Emission functions for release, gate and audit events
//!
//! Events are emitted at `info!` level (filter with `TLC_LOG`).

use tracing::{info, warn};

/// RAII guard that enters a tag-scoped span for the duration of an operation.
///
/// ```ignore
/// let _span = ReleaseSpan::enter("v1.0.0-rc.1", "run_gates");
/// // tracing calls are now associated with tag = "v1.0.0-rc.1"
/// ```
pub struct ReleaseSpan {
    _span: tracing::span::EnteredSpan,
}

impl ReleaseSpan {
    pub fn enter(tag: &str, operation: &'static str) -> Self {
        let span = tracing::info_span!("tlc.release", tag = %tag, operation = operation);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_release_started(tag: &str, tier: &str, commit: &str) {
    info!(event = "release.started", tag = %tag, tier = %tier, commit = %commit);
}

pub fn emit_transition(tag: &str, from: &str, to: &str) {
    info!(event = "release.transition", tag = %tag, from = %from, to = %to);
}

pub fn emit_gate_evaluated(tag: &str, gate: &str, passed: bool) {
    info!(event = "gate.evaluated", tag = %tag, gate = %gate, passed = passed);
}

pub fn emit_gates_completed(tag: &str, total: usize, failed: usize) {
    info!(
        event = "gate.completed",
        tag = %tag,
        total = total,
        failed = failed,
        passed = failed == 0,
    );
}

pub fn emit_promoted(tag: &str, promoted_tag: &str) {
    info!(event = "release.promoted", tag = %tag, promoted_tag = %promoted_tag);
}

pub fn emit_audit_appended(tag: &str, action: &str, position: u64) {
    info!(event = "audit.appended", tag = %tag, action = %action, position = position);
}

pub fn emit_integrity_checked(total: usize, tampered: usize) {
    if tampered == 0 {
        info!(event = "audit.verified", total = total);
    } else {
        warn!(event = "audit.tampered", total = total, tampered = tampered);
    }
}

pub fn emit_access_denied(tag: &str, user: &str, role: &str, action: &str) {
    warn!(event = "release.access_denied", tag = %tag, user = %user, role = %role, action = %action);
}

pub fn emit_notification_failed(channel: &str, tag: &str, error: &dyn std::fmt::Display) {
    warn!(event = "notify.failed", channel = %channel, tag = %tag, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitters_do_not_panic_without_subscriber() {
        emit_release_started("v1.0.0-rc.1", "rc", "abc123");
        emit_transition("v1.0.0-rc.1", "pending", "gates-running");
        emit_gate_evaluated("v1.0.0-rc.1", "tests", true);
        emit_gates_completed("v1.0.0-rc.1", 3, 1);
        emit_audit_appended("v1.0.0-rc.1", "created", 0);
        emit_integrity_checked(4, 1);
    }

    #[test]
    fn release_span_create() {
        let _span = ReleaseSpan::enter("v1.0.0-rc.1", "start_release");
    }
}
