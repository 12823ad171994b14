use serde::{Deserialize, Serialize};

use super::tier::Tier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageResponse {
    pub user_id: String,
    pub tier: Tier,
    pub activities_created: u32,
    pub activities_joined: u32,
    pub days_used: u32,
    /// `-1` means unlimited.
    pub max_activities: i32,
    /// `-1` means unlimited.
    pub max_radius_km: i32,
}

/// Body of `POST /me/tier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeTierRequest {
    pub tier: Tier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementHints {
    pub prompt_upgrade: bool,
    pub show_daily_suggestions: bool,
}

/// One entry of the tier catalog (`GET /tiers`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierResponse {
    pub tier: Tier,
    pub max_activities: i32,
    pub max_radius_km: i32,
    pub monthly_price: rust_decimal::Decimal,
}
