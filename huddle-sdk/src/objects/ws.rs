//! WebSocket message types for the real-time chat stream.
//!
//! The `GET /api/v1/ws` endpoint upgrades to a WebSocket connection.
//!
//! # Protocol
//!
//! 1. The client sends [`WsClientMessage::Authenticate`] as its first
//!    frame.
//! 2. On success the server answers [`WsServerMessage::Authenticated`] and
//!    starts pushing events for every activity the user belongs to.
//! 3. On failure the server closes with [`WsCloseCode::AUTH_FAILED`]
//!    without any error frame. Clients must not reconnect with the same
//!    credential.
//! 4. Any other close, or a dropped connection, is transient and may be
//!    retried with backoff.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chat::MessageResponse;
use super::join::JoinRequestResponse;

/// Client-to-server WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsClientMessage {
    Authenticate { token: String },
    Typing { event_id: Uuid, is_typing: bool },
    MarkRead { event_id: Uuid },
}

/// A user currently composing a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingUser {
    pub user_id: String,
    pub name: String,
}

/// Server-to-client WebSocket message.
///
/// Serialized as an internally-tagged JSON object so the client can
/// dispatch on the `"type"` field:
///
/// ```json
/// {"type":"new_message","message":{ ... }}
/// {"type":"typing_set_changed","event_id":"...","typing":[ ... ]}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    Authenticated {
        user_id: String,
    },
    NewMessage {
        message: MessageResponse,
    },
    /// The full set of other users typing in an activity.
    TypingSetChanged {
        event_id: Uuid,
        typing: Vec<TypingUser>,
    },
    ReadReceipt {
        event_id: Uuid,
        user_id: String,
        up_to_seq: u64,
    },
    JoinRequestResolved {
        request: JoinRequestResponse,
    },
    /// A rejected client frame. Does not close the connection.
    Error {
        code: u16,
        reason: String,
    },
}

/// Well-known WebSocket close codes used by the chat stream.
///
/// Codes in the 4000–4999 range are reserved for application use by
/// [RFC 6455 §7.4.2](https://www.rfc-editor.org/rfc/rfc6455#section-7.4.2).
pub struct WsCloseCode;

impl WsCloseCode {
    pub const NORMAL: u16 = 1000;

    pub const INTERNAL_ERROR: u16 = 1011;

    /// The credential was missing, malformed, expired or revoked.
    pub const AUTH_FAILED: u16 = 4001;

    /// A client frame could not be parsed.
    pub const BAD_FRAME: u16 = 4400;

    /// The client is not a participant of the referenced activity.
    pub const FORBIDDEN: u16 = 4403;
}
