//! Global atomic counters for pipeline observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a CLI command finishes).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    releases_started: AtomicU64,
    gate_runs: AtomicU64,
    gate_failures: AtomicU64,
    audit_appends: AtomicU64,
    promotions: AtomicU64,
    access_denials: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            releases_started: AtomicU64::new(0),
            gate_runs: AtomicU64::new(0),
            gate_failures: AtomicU64::new(0),
            audit_appends: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
            access_denials: AtomicU64::new(0),
        }
    }

    fn bump(counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = name, "counter incremented");
    }

    pub fn inc_releases_started(&self) {
        Self::bump(&self.releases_started, "releases_started");
    }

    /// Count one dispatched gate and whether it failed.
    pub fn record_gate_run(&self, passed: bool) {
        Self::bump(&self.gate_runs, "gate_runs");
        if !passed {
            Self::bump(&self.gate_failures, "gate_failures");
        }
    }

    pub fn inc_audit_appends(&self) {
        Self::bump(&self.audit_appends, "audit_appends");
    }

    pub fn inc_promotions(&self) {
        Self::bump(&self.promotions, "promotions");
    }

    pub fn inc_access_denials(&self) {
        Self::bump(&self.access_denials, "access_denials");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            releases_started = self.releases_started(),
            gate_runs = self.gate_runs(),
            gate_failures = self.gate_failures(),
            audit_appends = self.audit_appends(),
            promotions = self.promotions(),
            access_denials = self.access_denials(),
        );
    }

    pub fn releases_started(&self) -> u64 {
        self.releases_started.load(Ordering::Relaxed)
    }

    pub fn gate_runs(&self) -> u64 {
        self.gate_runs.load(Ordering::Relaxed)
    }

    pub fn gate_failures(&self) -> u64 {
        self.gate_failures.load(Ordering::Relaxed)
    }

    pub fn audit_appends(&self) -> u64 {
        self.audit_appends.load(Ordering::Relaxed)
    }

    pub fn promotions(&self) -> u64 {
        self.promotions.load(Ordering::Relaxed)
    }

    pub fn access_denials(&self) -> u64 {
        self.access_denials.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.releases_started,
            &self.gate_runs,
            &self.gate_failures,
            &self.audit_appends,
            &self.promotions,
            &self.access_denials,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_releases_started();
        m.record_gate_run(true);
        m.record_gate_run(false);
        m.inc_audit_appends();
        m.inc_audit_appends();
        assert_eq!(m.releases_started(), 1);
        assert_eq!(m.gate_runs(), 2);
        assert_eq!(m.gate_failures(), 1);
        assert_eq!(m.audit_appends(), 2);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_promotions();
        m.inc_access_denials();
        m.record_gate_run(false);
        m.reset();
        assert_eq!(m.promotions(), 0);
        assert_eq!(m.access_denials(), 0);
        assert_eq!(m.gate_failures(), 0);
    }
}
