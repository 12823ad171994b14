//! Error body returned by every failing REST call.

use serde::{Deserialize, Serialize};

use super::tier::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    InvalidSpec,
    InvalidMessage,
    QuotaExceeded,
    RadiusNotAllowed,
    Conflict,
    NotFound,
    InvalidState,
    Forbidden,
    Unauthorized,
    Unavailable,
}

impl ApiErrorKind {
    /// Whether the same call may succeed after re-reading current state.
    pub fn is_retryable(self) -> bool {
        matches!(self, ApiErrorKind::Conflict | ApiErrorKind::Unavailable)
    }
}

/// Policy rejections carry `tier` and `limit` so the UI can offer an upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub kind: ApiErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<f64>,
}

impl ApiErrorBody {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            tier: None,
            limit: None,
        }
    }

    pub fn with_limit(mut self, tier: Tier, limit: f64) -> Self {
        self.tier = Some(tier);
        self.limit = Some(limit);
        self
    }
}
