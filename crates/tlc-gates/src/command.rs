//! Gate command definitions.

use serde::{Deserialize, Serialize};
use tlc_core::policy::GateCommandSpec;
use tlc_core::GateName;

/// Timeout applied when a gate command does not set `timeoutSecs`.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Environment variables exported to every gate command.
pub const ENV_TAG: &str = "TLC_TAG";
pub const ENV_COMMIT: &str = "TLC_COMMIT";
pub const ENV_TIER: &str = "TLC_TIER";
pub const ENV_GATE: &str = "TLC_GATE";
pub const ENV_COVERAGE_THRESHOLD: &str = "TLC_COVERAGE_THRESHOLD";

/// One automated gate bound to the process that evaluates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateCommand {
    /// Gate this command decides.
    pub gate: GateName,

    /// Command to execute (first element is executable).
    pub command: Vec<String>,

    /// Timeout in seconds. Zero disables the deadline.
    pub timeout_secs: u64,
}

impl GateCommand {
    pub fn new(gate: GateName, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            gate,
            command,
            timeout_secs,
        }
    }

    /// Build from a validated `gateCommands` entry.
    pub fn from_spec(gate: GateName, spec: &GateCommandSpec) -> Self {
        Self::new(
            gate,
            spec.command.clone(),
            spec.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Run the command through `sh -c`.
    pub fn shell(gate: GateName, script: &str, timeout_secs: u64) -> Self {
        Self::new(
            gate,
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            timeout_secs,
        )
    }

    /// Human-readable argv for logs.
    pub fn display(&self) -> String {
        self.command.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_spec_applies_default_timeout() {
        let spec = GateCommandSpec {
            command: vec!["cargo".to_string(), "test".to_string()],
            timeout_secs: None,
        };
        let cmd = GateCommand::from_spec(GateName::Tests, &spec);
        assert_eq!(cmd.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(cmd.display(), "cargo test");
    }

    #[test]
    fn from_spec_keeps_explicit_timeout() {
        let spec = GateCommandSpec {
            command: vec!["cargo".to_string(), "audit".to_string()],
            timeout_secs: Some(45),
        };
        let cmd = GateCommand::from_spec(GateName::Security, &spec);
        assert_eq!(cmd.gate, GateName::Security);
        assert_eq!(cmd.timeout_secs, 45);
    }

    #[test]
    fn shell_wraps_script() {
        let cmd = GateCommand::shell(GateName::Coverage, "exit 0", 5);
        assert_eq!(cmd.command, vec!["sh", "-c", "exit 0"]);
    }
}
