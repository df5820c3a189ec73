//! In-memory fakes for the manager's collaborators (testing only)
//!
//! `ScriptedGateRunner` replays queued outcomes per gate and passes any gate
//! with nothing queued. `RecordingNotifier` keeps every delivery.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{GateName, GateResult, Release};
use crate::gate_runner::{GateRunner, GateRunnerError};
use crate::notify::{Notification, Notifier};

// ---------------------------------------------------------------------------
// ScriptedGateRunner
// ---------------------------------------------------------------------------

/// One scripted gate outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    Pass,
    Fail(String),
    TimeOut,
    Error(String),
}

#[derive(Debug, Default)]
pub struct ScriptedGateRunner {
    script: Mutex<HashMap<GateName, VecDeque<Scripted>>>,
    calls: Mutex<Vec<(GateName, String)>>,
    delay: Option<Duration>,
}

impl ScriptedGateRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every `run` call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue outcomes for `gate`, consumed one per run.
    pub fn script(&self, gate: GateName, outcomes: impl IntoIterator<Item = Scripted>) {
        self.script
            .lock()
            .unwrap()
            .entry(gate)
            .or_default()
            .extend(outcomes);
    }

    pub fn fail_once(&self, gate: GateName, detail: &str) {
        self.script(gate, [Scripted::Fail(detail.to_string())]);
    }

    /// Every `(gate, tag)` the runner was asked to run, in call order.
    pub fn calls(&self) -> Vec<(GateName, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn gates_run(&self) -> Vec<GateName> {
        self.calls().into_iter().map(|(gate, _)| gate).collect()
    }
}

#[async_trait]
impl GateRunner for ScriptedGateRunner {
    async fn run(&self, gate: GateName, release: &Release) -> Result<GateResult, GateRunnerError> {
        self.calls.lock().unwrap().push((gate, release.tag.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .script
            .lock()
            .unwrap()
            .get_mut(&gate)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Scripted::Pass);

        match next {
            Scripted::Pass => Ok(GateResult::pass(gate)),
            Scripted::Fail(detail) => Ok(GateResult::fail(gate, detail)),
            Scripted::TimeOut => Err(GateRunnerError::TimedOut {
                gate,
                timeout_secs: 1,
            }),
            Scripted::Error(message) => Err(GateRunnerError::Failed { gate, message }),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Notification)>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent delivery fail (nothing is recorded).
    pub fn fail_deliveries(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, Notification)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, channel: &str, notification: &Notification) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("channel {channel} unreachable");
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel.to_string(), notification.clone()));
        Ok(())
    }
}
