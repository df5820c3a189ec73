//! Tier policy resolution.
//!
//! A [`RawConfig`] is the user-supplied configuration document (camelCase
//! JSON or TOML). [`load`] validates it, then merges every tier override
//! onto the built-in defaults field by field, producing an immutable
//! [`ReleaseConfig`]. Validation and merging are pure.

mod defaults;
mod loader;
mod validate;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{GateName, PipelineError, Result, Tier};

pub use defaults::{
    default_policy, DEFAULT_PREVIEW_DOMAIN, DEFAULT_PREVIEW_URL_TEMPLATE, DEFAULT_TAG_PATTERN,
};
pub use loader::{load_from_path, read_raw};
pub use validate::{validate, ValidationReport};

// ---------------------------------------------------------------------------
// Resolved types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentStrategy {
    Rolling,
    BlueGreen,
    Canary,
    Recreate,
}

impl DeploymentStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rolling => "rolling",
            Self::BlueGreen => "blue-green",
            Self::Canary => "canary",
            Self::Recreate => "recreate",
        }
    }
}

impl fmt::Display for DeploymentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a release on one tier must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierPolicy {
    pub tier: Tier,
    pub gates: BTreeSet<GateName>,
    pub coverage_threshold: u8,
    pub auto_deploy: bool,
    pub requires_approval: bool,
    #[serde(rename = "requires2FA")]
    pub requires_2fa: bool,
    pub deployment_strategy: DeploymentStrategy,
}

impl TierPolicy {
    /// Gates dispatched to a runner, in a stable order.
    pub fn automated_gates(&self) -> Vec<GateName> {
        self.gates
            .iter()
            .copied()
            .filter(GateName::is_automated)
            .collect()
    }
}

/// Manager events that fan out to notification channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationEvent {
    OnDeploy,
    OnAccept,
    OnReject,
    OnPromote,
    OnGatesFailed,
}

impl NotificationEvent {
    pub const ALL: [NotificationEvent; 5] = [
        NotificationEvent::OnDeploy,
        NotificationEvent::OnAccept,
        NotificationEvent::OnReject,
        NotificationEvent::OnPromote,
        NotificationEvent::OnGatesFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnDeploy => "onDeploy",
            Self::OnAccept => "onAccept",
            Self::OnReject => "onReject",
            Self::OnPromote => "onPromote",
            Self::OnGatesFailed => "onGatesFailed",
        }
    }
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationEvent {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        NotificationEvent::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| PipelineError::Format(format!("unknown notification event '{s}'")))
    }
}

/// Command line a gate runner executes for one gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GateCommandSpec {
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Fully resolved pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseConfig {
    pub tag_pattern: String,
    pub preview_url_template: String,
    pub preview_domain: String,
    pub tiers: BTreeMap<Tier, TierPolicy>,
    pub notifications: BTreeMap<NotificationEvent, Vec<String>>,
    pub gate_commands: BTreeMap<GateName, GateCommandSpec>,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            tag_pattern: DEFAULT_TAG_PATTERN.to_string(),
            preview_url_template: DEFAULT_PREVIEW_URL_TEMPLATE.to_string(),
            preview_domain: DEFAULT_PREVIEW_DOMAIN.to_string(),
            tiers: Tier::ALL
                .into_iter()
                .map(|tier| (tier, default_policy(tier)))
                .collect(),
            notifications: BTreeMap::new(),
            gate_commands: BTreeMap::new(),
        }
    }
}

impl ReleaseConfig {
    pub fn policy(&self, tier: Tier) -> Option<&TierPolicy> {
        self.tiers.get(&tier)
    }

    /// Channels subscribed to `event`; empty when none are configured.
    pub fn channels(&self, event: NotificationEvent) -> &[String] {
        self.notifications
            .get(&event)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Raw (user-supplied) types
// ---------------------------------------------------------------------------

/// Per-tier override. Every field is optional; absent fields keep defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TierOverride {
    #[serde(default)]
    pub gates: Option<Vec<String>>,
    #[serde(default)]
    pub coverage_threshold: Option<u32>,
    #[serde(default)]
    pub auto_deploy: Option<bool>,
    #[serde(default)]
    pub requires_approval: Option<bool>,
    #[serde(default, rename = "requires2FA")]
    pub requires_2fa: Option<bool>,
    #[serde(default)]
    pub deployment_strategy: Option<DeploymentStrategy>,
}

/// Configuration document as written by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawConfig {
    #[serde(default)]
    pub tag_pattern: Option<String>,
    #[serde(default)]
    pub preview_url_template: Option<String>,
    #[serde(default)]
    pub preview_domain: Option<String>,
    #[serde(default)]
    pub tiers: BTreeMap<String, TierOverride>,
    #[serde(default)]
    pub notifications: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub gate_commands: BTreeMap<String, GateCommandSpec>,
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Validate `raw` and resolve it against the defaults.
pub fn load(raw: RawConfig) -> Result<ReleaseConfig> {
    let report = validate(&raw);
    if !report.valid {
        return Err(PipelineError::Format(format!(
            "invalid configuration: {}",
            report.errors.join("; ")
        )));
    }

    let mut config = ReleaseConfig::default();
    if let Some(pattern) = raw.tag_pattern {
        config.tag_pattern = pattern;
    }
    if let Some(template) = raw.preview_url_template {
        config.preview_url_template = template;
    }
    if let Some(domain) = raw.preview_domain {
        config.preview_domain = domain;
    }

    for (name, tier_override) in &raw.tiers {
        let tier: Tier = name.parse()?;
        let merged = merge_tier(&default_policy(tier), tier_override)?;
        config.tiers.insert(tier, merged);
    }

    for (name, channels) in raw.notifications {
        let event: NotificationEvent = name.parse()?;
        let channels: Vec<String> = serde_json::from_value(channels)?;
        config.notifications.insert(event, channels);
    }

    for (name, spec) in raw.gate_commands {
        config.gate_commands.insert(name.parse()?, spec);
    }

    Ok(config)
}

/// Merge one override onto a base policy. Each field is taken from the
/// override when present; a `gates` list replaces the base list.
pub fn merge_tier(base: &TierPolicy, tier_override: &TierOverride) -> Result<TierPolicy> {
    let gates = match &tier_override.gates {
        Some(names) => names
            .iter()
            .map(|name| name.parse::<GateName>())
            .collect::<Result<BTreeSet<_>>>()?,
        None => base.gates.clone(),
    };
    let coverage_threshold = match tier_override.coverage_threshold {
        Some(value) => u8::try_from(value)
            .ok()
            .filter(|v| *v <= 100)
            .ok_or_else(|| {
                PipelineError::Format(format!("coverage threshold {value} exceeds 100"))
            })?,
        None => base.coverage_threshold,
    };

    Ok(TierPolicy {
        tier: base.tier,
        gates,
        coverage_threshold,
        auto_deploy: tier_override.auto_deploy.unwrap_or(base.auto_deploy),
        requires_approval: tier_override
            .requires_approval
            .unwrap_or(base.requires_approval),
        requires_2fa: tier_override.requires_2fa.unwrap_or(base.requires_2fa),
        deployment_strategy: tier_override
            .deployment_strategy
            .unwrap_or(base.deployment_strategy),
    })
}

/// Gates required on `tier`. Unknown tiers yield an empty list.
pub fn get_gates_for_tier(config: &ReleaseConfig, tier: &str) -> Vec<GateName> {
    tier.parse::<Tier>()
        .ok()
        .and_then(|tier| config.policy(tier))
        .map(|policy| policy.gates.iter().copied().collect())
        .unwrap_or_default()
}

/// Render the preview URL template for `tag` on `domain`.
pub fn get_preview_url(config: &ReleaseConfig, tag: &str, domain: &str) -> String {
    config
        .preview_url_template
        .replace("{tag}", tag)
        .replace("{domain}", domain)
}
