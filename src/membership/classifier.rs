//! Maps a member's guild roles to whitelist status and queue priority

use serde::Serialize;

use crate::config::{PriorityTier, RoleConfig};

/// What a member's role set grants them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoleClassification {
    pub is_whitelisted: bool,
    pub tier: Option<PriorityTier>,
}

impl RoleClassification {
    pub fn tier_label(&self) -> Option<&'static str> {
        self.tier.map(|t| t.label())
    }
}

/// Classify a role set. `None` (membership unknown) classifies like an empty set.
///
/// When several tier roles are held, the highest-precedence tier wins,
/// independent of the order Discord lists the roles in.
pub fn classify(config: &RoleConfig, roles: Option<&[String]>) -> RoleClassification {
    let roles = roles.unwrap_or(&[]);
    let has = |role_id: &str| roles.iter().any(|r| r == role_id);

    let is_whitelisted = !config.whitelist_role_id.is_empty() && has(&config.whitelist_role_id);

    let tier = config
        .tiers
        .entries()
        .iter()
        .find(|(role_id, _)| has(role_id))
        .map(|(_, tier)| *tier);

    RoleClassification {
        is_whitelisted,
        tier,
    }
}
