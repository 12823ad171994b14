use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Subscription tiers, lowest first.
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Silver,
    Gold,
    Platinum,
}
