//! `GET /ws`: the real-time chat stream.
//!
//! The first client frame must be `authenticate`. After that the socket
//! receives every event of the activities the user belongs to and may send
//! `typing` and `mark_read` frames. The session ends with close code 4001 once
//! the token lapses or stops verifying after an auth reload.

use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use huddle_core::chat::{ChatConnection, ConnectError};
use huddle_core::coordinator::{CoordinatorError, MarkRead, Typing};
use huddle_sdk::objects::ws::{WsClientMessage, WsCloseCode, WsServerMessage};
use kanau::processor::Processor;
use time::OffsetDateTime;
use tokio::time::Instant;

use super::convert;
use crate::state::AppState;

/// How long a fresh socket may stay silent before it must authenticate.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn chat_ws(state: State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let app_state = state.0.clone();
    ws.on_upgrade(move |socket| handle_chat_ws(socket, app_state))
}

async fn handle_chat_ws(mut socket: WebSocket, state: AppState) {
    let Some(token) = read_credential(&mut socket).await else {
        close(&mut socket, WsCloseCode::AUTH_FAILED, "authentication failed").await;
        return;
    };

    let mut conn = match state.hub.open(&token).await {
        Ok(conn) => conn,
        Err(ConnectError::AuthRejected) => {
            close(&mut socket, WsCloseCode::AUTH_FAILED, "authentication failed").await;
            return;
        }
        Err(ConnectError::Repository(e)) => {
            tracing::error!(error = %e, "WS: failed to load memberships");
            close(&mut socket, WsCloseCode::INTERNAL_ERROR, "internal error").await;
            return;
        }
    };

    let greeting = WsServerMessage::Authenticated {
        user_id: conn.user_id().to_string(),
    };
    if send_json(&mut socket, &greeting).await.is_ok() {
        relay(&mut socket, &state, &mut conn).await;
    }
    conn.close().await;
}

/// Wait for the `authenticate` frame. Anything else is a failed attempt.
async fn read_credential(socket: &mut WebSocket) -> Option<String> {
    let frame = match tokio::time::timeout(AUTH_TIMEOUT, socket.recv()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(_) => {
            tracing::debug!("WS: connection ended before authenticating");
            return None;
        }
        Err(_) => {
            tracing::debug!("WS: authentication timed out");
            return None;
        }
    };
    match serde_json::from_str::<WsClientMessage>(frame.as_str()) {
        Ok(WsClientMessage::Authenticate { token }) => Some(token),
        _ => {
            tracing::debug!("WS: first frame was not an authenticate frame");
            None
        }
    }
}

/// Pump broker events out and client frames in until either side goes away
/// or the credential is no longer good.
async fn relay(socket: &mut WebSocket, state: &AppState, conn: &mut ChatConnection) {
    let mut auth_reloads = state.auth_reloads();
    loop {
        let deadline = expiry_deadline(conn.expires_at());
        tokio::select! {
            _ = sleep_until(deadline) => {
                tracing::debug!(user_id = %conn.user_id(), "WS: session token expired");
                close(socket, WsCloseCode::AUTH_FAILED, "session expired").await;
                return;
            }

            Ok(()) = auth_reloads.changed() => {
                if !conn.revalidate().await {
                    close(socket, WsCloseCode::AUTH_FAILED, "session revoked").await;
                    return;
                }
            }

            event = conn.next() => {
                let Some(event) = event else {
                    // Broker dropped: the server is shutting down.
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                };
                if let Some(frame) = convert::server_frame(&event) {
                    if send_json(socket, &frame).await.is_err() {
                        return;
                    }
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_frame(state, conn, text.as_str()).await;
                        if let Some(reply) = reply {
                            if send_json(socket, &reply).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                    Some(Ok(_)) => {
                        // Ping, pong and binary frames carry nothing for us.
                    }
                }
            }
        }
    }
}

/// Monotonic instant at which a credential expiring at `expires_at` lapses.
fn expiry_deadline(expires_at: Option<OffsetDateTime>) -> Option<Instant> {
    let remaining = expires_at? - OffsetDateTime::now_utc();
    let remaining = Duration::try_from(remaining).unwrap_or(Duration::ZERO);
    Some(Instant::now() + remaining)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Apply one client frame. Returns an error frame to send back, if any.
async fn handle_client_frame(
    state: &AppState,
    conn: &ChatConnection,
    text: &str,
) -> Option<WsServerMessage> {
    let frame = match serde_json::from_str::<WsClientMessage>(text) {
        Ok(frame) => frame,
        Err(e) => {
            return Some(WsServerMessage::Error {
                code: WsCloseCode::BAD_FRAME,
                reason: format!("unreadable frame: {e}"),
            });
        }
    };
    let user_id = conn.user_id().clone();
    let result = match frame {
        WsClientMessage::Authenticate { .. } => {
            return Some(WsServerMessage::Error {
                code: WsCloseCode::BAD_FRAME,
                reason: "already authenticated".to_owned(),
            });
        }
        WsClientMessage::Typing {
            event_id,
            is_typing,
        } => {
            state
                .coordinator
                .process(Typing {
                    event_id,
                    user_id,
                    is_typing,
                    connection: Some(conn.id()),
                })
                .await
        }
        WsClientMessage::MarkRead { event_id } => {
            state
                .coordinator
                .process(MarkRead { event_id, user_id })
                .await
        }
    };
    result.err().map(|err| WsServerMessage::Error {
        code: error_code(&err),
        reason: err.to_string(),
    })
}

fn error_code(err: &CoordinatorError) -> u16 {
    match err {
        CoordinatorError::Forbidden(_) | CoordinatorError::NotFound { .. } => {
            WsCloseCode::FORBIDDEN
        }
        CoordinatorError::Conflict(_) | CoordinatorError::Unavailable(_) => {
            WsCloseCode::INTERNAL_ERROR
        }
        _ => WsCloseCode::BAD_FRAME,
    }
}

async fn close(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

/// Serialize `value` as JSON and send it as a text WebSocket frame.
///
/// Returns `Err(())` if the send fails (client disconnected).
async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), ()> {
    let json = serde_json::to_string(value).map_err(|_| ())?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}
