use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /activities/{id}/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

/// Body of `POST /activities/{id}/typing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingRequest {
    pub is_typing: bool,
}

/// Where a history page starts, keyed by sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryCursor {
    /// The oldest messages.
    Start,
    /// Messages with a sequence number greater than the given one.
    After(u64),
    /// Messages with a sequence number lower than the given one.
    Before(u64),
    /// The newest messages.
    #[default]
    Latest,
}

impl HistoryCursor {
    /// Encode as a query-string value (`start`, `latest`, `after:12`, `before:40`).
    pub fn to_query_value(self) -> String {
        match self {
            HistoryCursor::Start => "start".to_owned(),
            HistoryCursor::Latest => "latest".to_owned(),
            HistoryCursor::After(seq) => format!("after:{seq}"),
            HistoryCursor::Before(seq) => format!("before:{seq}"),
        }
    }

    /// Decode the format produced by [`to_query_value`](Self::to_query_value).
    pub fn from_query_value(value: &str) -> Option<Self> {
        match value {
            "start" => Some(HistoryCursor::Start),
            "latest" => Some(HistoryCursor::Latest),
            other => {
                let (kind, seq) = other.split_once(':')?;
                let seq = seq.parse().ok()?;
                match kind {
                    "after" => Some(HistoryCursor::After(seq)),
                    "before" => Some(HistoryCursor::Before(seq)),
                    _ => None,
                }
            }
        }
    }
}

/// Query string of `GET /activities/{id}/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub event_id: Uuid,
    pub seq: u64,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub created_at: i64,
    #[serde(default)]
    pub read_by: Vec<String>,
}

/// A page of messages, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<MessageResponse>,
    /// Cursor for the following (newer) page, if any.
    pub newer: Option<HistoryCursor>,
    /// Cursor for the preceding (older) page, if any.
    pub older: Option<HistoryCursor>,
}
