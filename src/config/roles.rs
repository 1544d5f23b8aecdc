use serde::Serialize;

/// Queue priority tiers, declared in precedence order (highest first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PriorityTier {
    Platinum,
    Gold,
    Silver,
    Bronze,
}

impl PriorityTier {
    pub const ALL: [PriorityTier; 4] = [
        PriorityTier::Platinum,
        PriorityTier::Gold,
        PriorityTier::Silver,
        PriorityTier::Bronze,
    ];

    /// Human-readable label shown on member pages
    pub fn label(&self) -> &'static str {
        match self {
            PriorityTier::Platinum => "Platinum Priority",
            PriorityTier::Gold => "Gold Priority",
            PriorityTier::Silver => "Silver Priority",
            PriorityTier::Bronze => "Bronze Priority",
        }
    }

    /// Environment variable holding the Discord role ID for this tier
    pub fn env_key(&self) -> &'static str {
        match self {
            PriorityTier::Platinum => "QUEUE_PRIORITY_PLATINUM_ID",
            PriorityTier::Gold => "QUEUE_PRIORITY_GOLD_ID",
            PriorityTier::Silver => "QUEUE_PRIORITY_SILVER_ID",
            PriorityTier::Bronze => "QUEUE_PRIORITY_BRONZE_ID",
        }
    }
}

/// Role ID -> tier mapping, kept in precedence order
#[derive(Debug, Clone, Default)]
pub struct TierTable {
    entries: Vec<(String, PriorityTier)>,
}

impl TierTable {
    /// Build the table from `(tier, role_id)` pairs. Blank role IDs are dropped
    /// and entries are sorted into precedence order regardless of input order.
    pub fn new<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (PriorityTier, String)>,
    {
        let mut entries: Vec<(String, PriorityTier)> = pairs
            .into_iter()
            .filter(|(_, role_id)| !role_id.trim().is_empty())
            .map(|(tier, role_id)| (role_id.trim().to_string(), tier))
            .collect();
        entries.sort_by_key(|(_, tier)| *tier as u8);
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, PriorityTier)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Immutable role configuration, built once at startup
#[derive(Debug, Clone, Default)]
pub struct RoleConfig {
    /// Role that marks a member as whitelisted. Empty means nobody is.
    pub whitelist_role_id: String,
    pub tiers: TierTable,
}

impl RoleConfig {
    pub fn new(whitelist_role_id: impl Into<String>, tiers: TierTable) -> Self {
        Self {
            whitelist_role_id: whitelist_role_id.into().trim().to_string(),
            tiers,
        }
    }
}
