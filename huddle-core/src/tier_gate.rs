//! Tier Gate: pure policy over the fixed subscription catalog.

use lazy_static::lazy_static;
use rust_decimal::Decimal;

use crate::entities::TierName;

/// Marks an unlimited quota or radius.
pub const UNLIMITED: i32 = -1;

/// Accounts at least this many days old on the free tier are nudged to upgrade.
pub const UPGRADE_PROMPT_DAYS: u32 = 8;

/// Accounts at least this many days old see daily suggestions.
pub const DAILY_SUGGESTION_DAYS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionTier {
    pub name: TierName,
    pub max_activities: i32,
    pub max_radius_km: i32,
    pub monthly_price: Decimal,
}

lazy_static! {
    static ref CATALOG: [SubscriptionTier; 4] = [
        SubscriptionTier {
            name: TierName::Free,
            max_activities: 3,
            max_radius_km: 10,
            monthly_price: Decimal::ZERO,
        },
        SubscriptionTier {
            name: TierName::Silver,
            max_activities: 10,
            max_radius_km: 25,
            monthly_price: Decimal::new(499, 2),
        },
        SubscriptionTier {
            name: TierName::Gold,
            max_activities: 30,
            max_radius_km: 50,
            monthly_price: Decimal::new(999, 2),
        },
        SubscriptionTier {
            name: TierName::Platinum,
            max_activities: UNLIMITED,
            max_radius_km: UNLIMITED,
            monthly_price: Decimal::new(1999, 2),
        },
    ];
}

/// The catalog, lowest tier first.
pub fn catalog() -> &'static [SubscriptionTier] {
    CATALOG.as_slice()
}

impl TierName {
    pub fn limits(self) -> &'static SubscriptionTier {
        match self {
            TierName::Free => &CATALOG[0],
            TierName::Silver => &CATALOG[1],
            TierName::Gold => &CATALOG[2],
            TierName::Platinum => &CATALOG[3],
        }
    }
}

pub fn can_create_activity(tier: &SubscriptionTier, current_count: u32) -> bool {
    match u32::try_from(tier.max_activities) {
        Ok(max) => current_count < max,
        Err(_) => tier.max_activities == UNLIMITED,
    }
}

pub fn is_radius_allowed(tier: &SubscriptionTier, radius_km: f64) -> bool {
    if tier.max_radius_km == UNLIMITED {
        return !radius_km.is_nan();
    }
    radius_km <= f64::from(tier.max_radius_km)
}

pub fn should_prompt_upgrade(days_used: u32, tier: TierName) -> bool {
    tier == TierName::Free && days_used >= UPGRADE_PROMPT_DAYS
}

pub fn should_show_daily_suggestions(days_used: u32) -> bool {
    days_used >= DAILY_SUGGESTION_DAYS
}
