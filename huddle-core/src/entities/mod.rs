pub mod event;
pub mod join_request;
pub mod message;
pub mod usage;

use compact_str::CompactString;
use huddle_sdk::objects::{
    Decision as SdkDecision, JoinStatus as SdkJoinStatus, Tier as SdkTier,
};

/// Opaque user identity issued by the authentication collaborator.
pub type UserId = CompactString;

/// Subscription tier name.
///
/// This is the engine version. For API/DTO use, see `huddle_sdk::objects::Tier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TierName {
    Free,
    Silver,
    Gold,
    Platinum,
}

impl TierName {
    pub const ALL: [TierName; 4] = [
        TierName::Free,
        TierName::Silver,
        TierName::Gold,
        TierName::Platinum,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TierName::Free => "free",
            TierName::Silver => "silver",
            TierName::Gold => "gold",
            TierName::Platinum => "platinum",
        }
    }
}

impl std::fmt::Display for TierName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<TierName> for SdkTier {
    fn from(value: TierName) -> Self {
        match value {
            TierName::Free => SdkTier::Free,
            TierName::Silver => SdkTier::Silver,
            TierName::Gold => SdkTier::Gold,
            TierName::Platinum => SdkTier::Platinum,
        }
    }
}

impl From<SdkTier> for TierName {
    fn from(value: SdkTier) -> Self {
        match value {
            SdkTier::Free => TierName::Free,
            SdkTier::Silver => TierName::Silver,
            SdkTier::Gold => TierName::Gold,
            SdkTier::Platinum => TierName::Platinum,
        }
    }
}

impl From<join_request::JoinStatus> for SdkJoinStatus {
    fn from(value: join_request::JoinStatus) -> Self {
        match value {
            join_request::JoinStatus::Pending => SdkJoinStatus::Pending,
            join_request::JoinStatus::Accepted => SdkJoinStatus::Accepted,
            join_request::JoinStatus::Rejected => SdkJoinStatus::Rejected,
        }
    }
}

impl From<SdkDecision> for join_request::Decision {
    fn from(value: SdkDecision) -> Self {
        match value {
            SdkDecision::Accept => join_request::Decision::Accept,
            SdkDecision::Reject => join_request::Decision::Reject,
        }
    }
}
