//! Role-based access to release operations.
//!
//! Access is a data table of `(action, allowed roles)` rows evaluated by
//! [`AccessPolicy::authorize`]. An action with no row is denied.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Caller role. Unrecognised role names are kept verbatim and never match
/// a rule that lists specific roles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Qa,
    Developer,
    Viewer,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => "admin",
            Self::Qa => "qa",
            Self::Developer => "developer",
            Self::Viewer => "viewer",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for Role {
    fn from(name: String) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "admin" => Self::Admin,
            "qa" => Self::Qa,
            "developer" => Self::Developer,
            "viewer" => Self::Viewer,
            _ => Self::Other(name),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    StartRelease,
    ViewRelease,
    DeployPreview,
    AcceptRelease,
    RejectRelease,
    RetryGates,
    PromoteRelease,
    ViewAudit,
    VerifyAudit,
    ExportAudit,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartRelease => "start-release",
            Self::ViewRelease => "view-release",
            Self::DeployPreview => "deploy-preview",
            Self::AcceptRelease => "accept-release",
            Self::RejectRelease => "reject-release",
            Self::RetryGates => "retry-gates",
            Self::PromoteRelease => "promote-release",
            Self::ViewAudit => "view-audit",
            Self::VerifyAudit => "verify-audit",
            Self::ExportAudit => "export-audit",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Allowed {
    AnyRole,
    Roles(Vec<Role>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    pub action: Action,
    pub allowed: Allowed,
}

impl AccessRule {
    pub fn any_role(action: Action) -> Self {
        Self {
            action,
            allowed: Allowed::AnyRole,
        }
    }

    pub fn roles(action: Action, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            action,
            allowed: Allowed::Roles(roles.into_iter().collect()),
        }
    }

    fn permits(&self, role: &Role) -> bool {
        match &self.allowed {
            Allowed::AnyRole => true,
            Allowed::Roles(roles) => roles.contains(role),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthzDecision {
    Allowed,
    Denied { reason: String },
}

impl AuthzDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub rules: Vec<AccessRule>,
}

impl AccessPolicy {
    /// Standard table: only `qa` and `admin` may accept or reject; every
    /// other operation is open to any role.
    pub fn standard() -> Self {
        use Action::*;

        Self {
            rules: vec![
                AccessRule::any_role(StartRelease),
                AccessRule::any_role(ViewRelease),
                AccessRule::any_role(DeployPreview),
                AccessRule::roles(AcceptRelease, [Role::Qa, Role::Admin]),
                AccessRule::roles(RejectRelease, [Role::Qa, Role::Admin]),
                AccessRule::any_role(RetryGates),
                AccessRule::any_role(PromoteRelease),
                AccessRule::any_role(ViewAudit),
                AccessRule::any_role(VerifyAudit),
                AccessRule::any_role(ExportAudit),
            ],
        }
    }

    /// Replace the rule for `rule.action` (builder pattern).
    pub fn with_rule(mut self, rule: AccessRule) -> Self {
        self.rules.retain(|existing| existing.action != rule.action);
        self.rules.push(rule);
        self
    }

    pub fn authorize(&self, role: &Role, action: Action) -> AuthzDecision {
        match self.rules.iter().find(|rule| rule.action == action) {
            Some(rule) if rule.permits(role) => AuthzDecision::Allowed,
            Some(_) => AuthzDecision::Denied {
                reason: format!("role '{role}' may not {action}"),
            },
            None => AuthzDecision::Denied {
                reason: format!("no access rule for {action}"),
            },
        }
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::standard()
    }
}
