//! Gate execution through child processes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tlc_core::policy::ReleaseConfig;
use tlc_core::{GateName, GateResult, GateRunner, GateRunnerError, Release, Tier};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::command::{
    GateCommand, ENV_COMMIT, ENV_COVERAGE_THRESHOLD, ENV_GATE, ENV_TAG, ENV_TIER,
};

/// Lines of output carried into a failing gate's detail.
const DETAIL_TAIL_LINES: usize = 5;

/// Captured result of one gate command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (0 = success, -1 when killed by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    /// Convert into the gate verdict recorded on the release.
    pub fn into_result(self, gate: GateName) -> GateResult {
        if self.passed() {
            return GateResult::pass(gate);
        }
        let tail = output_tail(&self.stderr, DETAIL_TAIL_LINES)
            .or_else(|| output_tail(&self.stdout, DETAIL_TAIL_LINES));
        match tail {
            Some(tail) => GateResult::fail(gate, format!("exit code {}: {tail}", self.exit_code)),
            None => GateResult::fail(gate, format!("exit code {}", self.exit_code)),
        }
    }
}

/// Last `lines` non-blank lines of `text`, or `None` when there are none.
fn output_tail(text: &str, lines: usize) -> Option<String> {
    let kept: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect();
    if kept.is_empty() {
        return None;
    }
    let start = kept.len().saturating_sub(lines);
    Some(kept[start..].join("\n"))
}

/// [`GateRunner`] that executes one configured command per automated gate.
///
/// A non-zero exit is a failing gate. A gate with no configured command
/// fails with a detail naming the missing entry so the release can be
/// retried once the configuration is fixed.
#[derive(Debug, Clone, Default)]
pub struct CommandGateRunner {
    commands: BTreeMap<GateName, GateCommand>,
    coverage_thresholds: BTreeMap<Tier, u8>,
    working_dir: Option<PathBuf>,
}

impl CommandGateRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every `gateCommands` entry and the per-tier coverage thresholds.
    pub fn from_config(config: &ReleaseConfig) -> Self {
        let commands = config
            .gate_commands
            .iter()
            .map(|(gate, spec)| (*gate, GateCommand::from_spec(*gate, spec)))
            .collect();
        let coverage_thresholds = config
            .tiers
            .iter()
            .map(|(tier, policy)| (*tier, policy.coverage_threshold))
            .collect();
        Self {
            commands,
            coverage_thresholds,
            working_dir: None,
        }
    }

    /// Register or replace the command for one gate.
    pub fn with_command(mut self, command: GateCommand) -> Self {
        self.commands.insert(command.gate, command);
        self
    }

    /// Run every command from `dir` instead of the current directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn command_for(&self, gate: GateName) -> Option<&GateCommand> {
        self.commands.get(&gate)
    }

    fn env_for(&self, gate: GateName, release: &Release) -> Vec<(&'static str, String)> {
        let mut env = vec![
            (ENV_TAG, release.tag.clone()),
            (ENV_COMMIT, release.commit_sha.clone()),
            (ENV_TIER, release.tier.to_string()),
            (ENV_GATE, gate.to_string()),
        ];
        if let Some(threshold) = self.coverage_thresholds.get(&release.tier) {
            env.push((ENV_COVERAGE_THRESHOLD, threshold.to_string()));
        }
        env
    }

    /// Spawn `command`, wait for it under its timeout and capture its output.
    pub async fn execute(
        &self,
        command: &GateCommand,
        release: &Release,
    ) -> Result<CommandOutput, GateRunnerError> {
        let gate = command.gate;
        let start = Instant::now();

        let Some((exe, args)) = command.command.split_first() else {
            return Err(GateRunnerError::Failed {
                gate,
                message: "empty command".to_string(),
            });
        };

        let mut process = Command::new(exe);
        process
            .args(args)
            .envs(self.env_for(gate, release))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            process.current_dir(dir);
        }

        let child = process.spawn().map_err(|e| GateRunnerError::Failed {
            gate,
            message: format!("failed to spawn {exe}: {e}"),
        })?;

        let waited = if command.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(command.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| GateRunnerError::TimedOut {
                gate,
                timeout_secs: command.timeout_secs,
            })?
        } else {
            child.wait_with_output().await
        };

        let output = waited.map_err(|e| GateRunnerError::Failed {
            gate,
            message: format!("failed to collect output of {exe}: {e}"),
        })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl GateRunner for CommandGateRunner {
    async fn run(&self, gate: GateName, release: &Release) -> Result<GateResult, GateRunnerError> {
        if !gate.is_automated() {
            return Err(GateRunnerError::Failed {
                gate,
                message: "manual gates are decided by a reviewer".to_string(),
            });
        }

        let Some(command) = self.commands.get(&gate) else {
            warn!(tag = %release.tag, gate = %gate, "no command configured for gate");
            return Ok(GateResult::fail(
                gate,
                format!("no command configured for gate {gate}"),
            ));
        };

        debug!(tag = %release.tag, gate = %gate, command = %command.display(), "gate command starting");
        let output = self.execute(command, release).await?;
        info!(
            tag = %release.tag,
            gate = %gate,
            exit_code = output.exit_code,
            duration_ms = output.duration_ms,
            "gate command finished"
        );
        Ok(output.into_result(gate))
    }
}
