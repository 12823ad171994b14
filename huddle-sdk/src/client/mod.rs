//! HTTP and WebSocket clients for the Huddle server.
//!
//! Gated behind the `client` cargo feature so downstream crates that only
//! need the shared types do not pull in `reqwest` or `tokio-tungstenite`.

mod api;
mod chat;

pub use api::ApiClient;
pub use chat::{ChatClient, ChatClientConfig, ConnectionState};

use reqwest::StatusCode;

use crate::objects::ApiErrorBody;

/// Errors produced by the SDK clients.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (DNS, TLS, connection reset, …).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("api error: status {status}, body: {raw}")]
    Api {
        status: StatusCode,
        body: Option<ApiErrorBody>,
        raw: String,
    },

    /// Response body could not be deserialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The base URL could not be joined with the endpoint path.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// The real-time connection is down or its outgoing buffer is full.
    #[error("transient transport failure: {0}")]
    Transport(String),
}

impl ClientError {
    /// Structured error body, when the server sent one.
    pub fn api_body(&self) -> Option<&ApiErrorBody> {
        match self {
            ClientError::Api { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}
