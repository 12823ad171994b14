pub mod account;
pub mod activity;
pub mod chat;
pub mod error;
pub mod join;
pub mod tier;
pub mod ws;

pub use account::{EngagementHints, TierResponse, UpgradeTierRequest, UsageResponse};
pub use activity::{
    ActivityResponse, CreateActivityRequest, DiscoverQuery, DiscoveredActivity, LocationDto,
    ParticipantDto,
};
pub use chat::{
    HistoryCursor, HistoryQuery, HistoryResponse, MessageResponse, SendMessageRequest,
    TypingRequest,
};
pub use error::{ApiErrorBody, ApiErrorKind};
pub use join::{
    Decision, JoinRequestResponse, JoinStatus, RequestToJoinBody, ResolveRequestBody,
};
pub use tier::Tier;
