use time::OffsetDateTime;

use super::{TierName, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserUsage {
    pub user_id: UserId,
    pub tier: TierName,
    pub activities_created: u32,
    pub activities_joined: u32,
    pub registered_at: OffsetDateTime,
}

impl UserUsage {
    /// Usage record for a user seen for the first time.
    pub fn first_seen(user_id: UserId, now: OffsetDateTime) -> Self {
        Self {
            user_id,
            tier: TierName::Free,
            activities_created: 0,
            activities_joined: 0,
            registered_at: now,
        }
    }

    /// Whole days since registration.
    pub fn days_used(&self, now: OffsetDateTime) -> u32 {
        let days = (now - self.registered_at).whole_days().max(0);
        u32::try_from(days).unwrap_or(u32::MAX)
    }
}
