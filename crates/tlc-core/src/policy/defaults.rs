//! Built-in tier policies.
//!
//! | tier    | gates                                  | coverage | auto | approval | 2FA | strategy   |
//! |---------|----------------------------------------|----------|------|----------|-----|------------|
//! | feature | tests                                  | 60       | yes  | no       | no  | recreate   |
//! | dev     | tests, coverage                        | 70       | yes  | no       | no  | rolling    |
//! | beta    | tests, security, coverage              | 80       | yes  | no       | no  | rolling    |
//! | rc      | tests, security, coverage, qa-approval | 85       | no   | yes      | no  | blue-green |
//! | release | tests, security, coverage, qa-approval | 90       | no   | yes      | yes | canary     |

use std::collections::BTreeSet;

use super::{DeploymentStrategy, TierPolicy};
use crate::domain::{GateName, Tier};

pub const DEFAULT_TAG_PATTERN: &str = "v*";
pub const DEFAULT_PREVIEW_URL_TEMPLATE: &str = "https://{tag}.{domain}";
pub const DEFAULT_PREVIEW_DOMAIN: &str = "preview.local";

pub fn default_policy(tier: Tier) -> TierPolicy {
    use GateName::*;

    let (gates, coverage_threshold, deployment_strategy) = match tier {
        Tier::Feature => (vec![Tests], 60, DeploymentStrategy::Recreate),
        Tier::Dev => (vec![Tests, Coverage], 70, DeploymentStrategy::Rolling),
        Tier::Beta => (
            vec![Tests, Security, Coverage],
            80,
            DeploymentStrategy::Rolling,
        ),
        Tier::Rc => (
            vec![Tests, Security, Coverage, QaApproval],
            85,
            DeploymentStrategy::BlueGreen,
        ),
        Tier::Release => (
            vec![Tests, Security, Coverage, QaApproval],
            90,
            DeploymentStrategy::Canary,
        ),
    };
    let gated_by_qa = matches!(tier, Tier::Rc | Tier::Release);

    TierPolicy {
        tier,
        gates: gates.into_iter().collect::<BTreeSet<_>>(),
        coverage_threshold,
        auto_deploy: !gated_by_qa,
        requires_approval: gated_by_qa,
        requires_2fa: tier == Tier::Release,
        deployment_strategy,
    }
}
