//! Configuration validation.
//!
//! Collects every problem in a [`RawConfig`] instead of stopping at the
//! first one, so a user can fix a document in one pass.

use std::collections::HashMap;

use serde::Serialize;

use super::{NotificationEvent, RawConfig};
use crate::domain::tag::compile_pattern;
use crate::domain::{GateName, Tier};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

pub fn validate(raw: &RawConfig) -> ValidationReport {
    let mut errors = Vec::new();

    if let Some(pattern) = &raw.tag_pattern {
        if pattern.trim().is_empty() {
            errors.push("tagPattern must not be empty".to_string());
        } else if pattern.chars().any(char::is_whitespace) {
            errors.push(format!("tagPattern '{pattern}' must not contain whitespace"));
        } else if let Err(e) = compile_pattern(pattern) {
            errors.push(e.to_string());
        }
    }

    if let Some(template) = &raw.preview_url_template {
        if !template.contains("{tag}") {
            errors.push(format!(
                "previewUrlTemplate '{template}' must contain the {{tag}} placeholder"
            ));
        }
    }

    if let Some(domain) = &raw.preview_domain {
        if domain.trim().is_empty() {
            errors.push("previewDomain must not be empty".to_string());
        }
    }

    let mut seen_tiers: HashMap<Tier, &str> = HashMap::new();
    for (name, tier_override) in &raw.tiers {
        let tier = match name.parse::<Tier>() {
            Ok(tier) => tier,
            Err(_) => {
                errors.push(format!("unknown tier '{name}'"));
                continue;
            }
        };
        if let Some(previous) = seen_tiers.insert(tier, name.as_str()) {
            errors.push(format!(
                "tier '{name}' configured twice (also as '{previous}')"
            ));
        }

        if let Some(gates) = &tier_override.gates {
            for gate in gates {
                if gate.parse::<GateName>().is_err() {
                    errors.push(format!("unknown gate '{gate}' in tier '{name}'"));
                }
            }
        }
        if let Some(threshold) = tier_override.coverage_threshold {
            if threshold > 100 {
                errors.push(format!(
                    "coverageThreshold {threshold} in tier '{name}' exceeds 100"
                ));
            }
        }
    }

    for (name, channels) in &raw.notifications {
        if name.parse::<NotificationEvent>().is_err() {
            errors.push(format!("unknown notification event '{name}'"));
            continue;
        }
        match channels.as_array() {
            None => errors.push(format!(
                "notifications.{name} must be a list of channel names"
            )),
            Some(list) => {
                for channel in list {
                    match channel.as_str() {
                        Some(s) if !s.trim().is_empty() => {}
                        Some(_) => errors.push(format!(
                            "notifications.{name} contains an empty channel name"
                        )),
                        None => errors.push(format!(
                            "notifications.{name} contains a non-string channel: {channel}"
                        )),
                    }
                }
            }
        }
    }

    for (name, spec) in &raw.gate_commands {
        match name.parse::<GateName>() {
            Err(_) => errors.push(format!("gateCommands has unknown gate '{name}'")),
            Ok(gate) if !gate.is_automated() => errors.push(format!(
                "gateCommands.{name}: {gate} is a manual gate and cannot run a command"
            )),
            Ok(_) => {}
        }
        if spec.command.first().map_or(true, |program| program.trim().is_empty()) {
            errors.push(format!("gateCommands.{name} has an empty command"));
        }
        if spec.timeout_secs == Some(0) {
            errors.push(format!("gateCommands.{name} timeoutSecs must be positive"));
        }
    }

    ValidationReport::from_errors(errors)
}
