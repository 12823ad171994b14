//! Reconnecting real-time chat client.
//!
//! [`ChatClient::connect`] spawns a supervisor task that owns the WebSocket.
//! Server frames are forwarded to the returned receiver; connection state is
//! published on a `watch` channel.
//!
//! Failure handling:
//! - An authentication rejection (close code 4001) stops the supervisor.
//!   Reconnecting with the same credential cannot succeed, so nothing is
//!   retried and only a single debug line is emitted.
//! - Anything else is transient and retried with exponential backoff up to
//!   `max_attempts` times. Failures are logged at most once per
//!   [`TRANSIENT_LOG_WINDOW`](crate::retry::TRANSIENT_LOG_WINDOW).
//! - [`ChatClient::logout`] cancels the supervisor, including a pending
//!   backoff sleep. No further attempts happen until a new `connect`.

use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::ClientError;
use crate::objects::ws::{WsClientMessage, WsCloseCode, WsServerMessage};
use crate::retry::{LogThrottle, reconnect_delay, with_jitter};

/// Default cap on consecutive failed connection attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

const OUTGOING_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    /// WebSocket endpoint, e.g. `wss://huddle.example.com/api/v1/ws`.
    pub url: Url,
    pub max_attempts: u32,
    /// Buffer size of the incoming event receiver.
    pub event_buffer: usize,
}

impl ChatClientConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            event_buffer: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Waiting before reconnect attempt number `attempt`.
    Backoff { attempt: u32 },
    /// The server refused the credential. Terminal.
    AuthRejected,
    /// Closed by [`ChatClient::logout`]. Terminal.
    Closed,
    /// `max_attempts` consecutive transient failures. Terminal.
    GaveUp,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConnectionState::AuthRejected | ConnectionState::Closed | ConnectionState::GaveUp
        )
    }
}

/// Handle to a running chat connection supervisor.
pub struct ChatClient {
    outgoing: mpsc::Sender<WsClientMessage>,
    state_rx: watch::Receiver<ConnectionState>,
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ChatClient {
    /// Start connecting with `token`.
    ///
    /// Returns the client handle and the receiver of pushed server events
    /// (new messages, typing sets, read receipts, join resolutions).
    pub fn connect(
        config: ChatClientConfig,
        token: impl Into<String>,
    ) -> (Self, mpsc::Receiver<WsServerMessage>) {
        let (outgoing, outgoing_rx) = mpsc::channel(OUTGOING_BUFFER);
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let supervisor = Supervisor {
            config,
            token: token.into(),
            outgoing_rx,
            events_tx,
            state_tx,
            cancel_rx,
            throttle: LogThrottle::default(),
        };
        let task = tokio::spawn(supervisor.run());

        (
            Self {
                outgoing,
                state_rx,
                cancel_tx,
                task,
            },
            events_rx,
        )
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn state_watcher(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn typing(&self, event_id: Uuid, is_typing: bool) -> Result<(), ClientError> {
        self.enqueue(WsClientMessage::Typing {
            event_id,
            is_typing,
        })
    }

    pub fn mark_read(&self, event_id: Uuid) -> Result<(), ClientError> {
        self.enqueue(WsClientMessage::MarkRead { event_id })
    }

    fn enqueue(&self, frame: WsClientMessage) -> Result<(), ClientError> {
        if self.state() != ConnectionState::Connected {
            return Err(ClientError::Transport("not connected".into()));
        }
        self.outgoing
            .try_send(frame)
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    /// Close the connection and cancel any pending reconnect.
    pub async fn logout(self) {
        let _ = self.cancel_tx.send(true);
        let _ = self.task.await;
    }
}

enum SessionEnd {
    Cancelled,
    AuthRejected,
    Transient(String),
}

struct Supervisor {
    config: ChatClientConfig,
    token: String,
    outgoing_rx: mpsc::Receiver<WsClientMessage>,
    events_tx: mpsc::Sender<WsServerMessage>,
    state_tx: watch::Sender<ConnectionState>,
    cancel_rx: watch::Receiver<bool>,
    throttle: LogThrottle,
}

impl Supervisor {
    async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            let _ = self.state_tx.send(ConnectionState::Connecting);

            match self.run_session(&mut attempt).await {
                SessionEnd::Cancelled => {
                    let _ = self.state_tx.send(ConnectionState::Closed);
                    break;
                }
                SessionEnd::AuthRejected => {
                    debug!(url = %self.config.url, "Chat credential rejected, staying disconnected");
                    let _ = self.state_tx.send(ConnectionState::AuthRejected);
                    break;
                }
                SessionEnd::Transient(reason) => {
                    if let Some(suppressed) = self.throttle.allow(Instant::now()) {
                        warn!(
                            url = %self.config.url,
                            attempt,
                            suppressed,
                            %reason,
                            "Chat connection failed, retrying with backoff"
                        );
                    }

                    if attempt >= self.config.max_attempts {
                        warn!(attempt, "Chat reconnect attempts exhausted");
                        let _ = self.state_tx.send(ConnectionState::GaveUp);
                        break;
                    }

                    let delay = with_jitter(reconnect_delay(attempt), &mut rand::rng());
                    attempt += 1;
                    let _ = self.state_tx.send(ConnectionState::Backoff { attempt });

                    tokio::select! {
                        biased;

                        _ = cancelled(&mut self.cancel_rx) => {
                            let _ = self.state_tx.send(ConnectionState::Closed);
                            break;
                        }

                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!("Chat supervisor stopped");
    }

    /// Connect, authenticate, then relay frames until the session ends.
    async fn run_session(&mut self, attempt: &mut u32) -> SessionEnd {
        let connect = tokio_tungstenite::connect_async(self.config.url.as_str());
        let (socket, _) = tokio::select! {
            biased;

            _ = cancelled(&mut self.cancel_rx) => return SessionEnd::Cancelled,

            result = connect => match result {
                Ok(pair) => pair,
                Err(e) => return SessionEnd::Transient(e.to_string()),
            },
        };
        let (mut sink, mut stream) = socket.split();

        let auth = WsClientMessage::Authenticate {
            token: self.token.clone(),
        };
        if let Err(reason) = send_json(&mut sink, &auth).await {
            return SessionEnd::Transient(reason);
        }

        // --- Handshake: the first server frame decides -----------------------
        let first = tokio::select! {
            biased;

            _ = cancelled(&mut self.cancel_rx) => return SessionEnd::Cancelled,

            frame = stream.next() => frame,
        };
        match first {
            Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                Ok(WsServerMessage::Authenticated { user_id }) => {
                    debug!(%user_id, "Chat connection authenticated");
                }
                Ok(_) => return SessionEnd::Transient("unexpected handshake frame".into()),
                Err(e) => return SessionEnd::Transient(e.to_string()),
            },
            Some(Ok(Message::Close(frame))) => return close_outcome(frame.as_ref()),
            Some(Ok(_)) => return SessionEnd::Transient("unexpected handshake frame".into()),
            Some(Err(e)) => return SessionEnd::Transient(e.to_string()),
            None => return SessionEnd::Transient("connection closed during handshake".into()),
        }

        *attempt = 0;
        let _ = self.state_tx.send(ConnectionState::Connected);

        // --- Relay ----------------------------------------------------------
        loop {
            tokio::select! {
                biased;

                _ = cancelled(&mut self.cancel_rx) => {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Cancelled;
                }

                Some(frame) = self.outgoing_rx.recv() => {
                    if let Err(reason) = send_json(&mut sink, &frame).await {
                        return SessionEnd::Transient(reason);
                    }
                }

                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WsServerMessage>(&text) {
                            Ok(event) => {
                                if self.events_tx.send(event).await.is_err() {
                                    // Nobody is listening any more.
                                    let _ = sink.send(Message::Close(None)).await;
                                    return SessionEnd::Cancelled;
                                }
                            }
                            Err(e) => debug!(error = %e, "Ignoring unparseable server frame"),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => return close_outcome(frame.as_ref()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Transient(e.to_string()),
                    None => return SessionEnd::Transient("connection closed".into()),
                },
            }
        }
    }
}

fn close_outcome(frame: Option<&CloseFrame<'_>>) -> SessionEnd {
    match frame {
        Some(frame) if u16::from(frame.code) == WsCloseCode::AUTH_FAILED => {
            SessionEnd::AuthRejected
        }
        Some(frame) => SessionEnd::Transient(format!(
            "closed by server ({}): {}",
            u16::from(frame.code),
            frame.reason
        )),
        None => SessionEnd::Transient("closed by server".into()),
    }
}

/// Resolves once cancellation is requested or the client handle is dropped.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn send_json<S>(sink: &mut S, value: &WsClientMessage) -> Result<(), String>
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = serde_json::to_string(value).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    #[test]
    fn test_auth_close_is_terminal() {
        let frame = CloseFrame {
            code: CloseCode::from(WsCloseCode::AUTH_FAILED),
            reason: Cow::Borrowed(""),
        };
        assert!(matches!(
            close_outcome(Some(&frame)),
            SessionEnd::AuthRejected
        ));
    }

    #[test]
    fn test_other_close_is_transient() {
        let frame = CloseFrame {
            code: CloseCode::Away,
            reason: Cow::Borrowed("restarting"),
        };
        assert!(matches!(
            close_outcome(Some(&frame)),
            SessionEnd::Transient(_)
        ));
        assert!(matches!(close_outcome(None), SessionEnd::Transient(_)));
    }

    #[tokio::test]
    async fn test_logout_during_backoff_stops_reconnects() {
        // Nothing listens on port 9 of localhost; every attempt fails fast.
        let url = Url::parse("ws://127.0.0.1:9/api/v1/ws").unwrap();
        let mut config = ChatClientConfig::new(url);
        config.max_attempts = 1000;
        let (client, _events) = ChatClient::connect(config, "token");

        let mut state = client.state_watcher();
        state
            .wait_for(|s| matches!(s, ConnectionState::Backoff { .. }))
            .await
            .unwrap();

        client.logout().await;
        assert_eq!(*state.borrow(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let url = Url::parse("ws://127.0.0.1:9/api/v1/ws").unwrap();
        let mut config = ChatClientConfig::new(url);
        config.max_attempts = 0;
        let (client, _events) = ChatClient::connect(config, "token");

        let mut state = client.state_watcher();
        let last = state.wait_for(|s| s.is_terminal()).await.unwrap();
        assert_eq!(*last, ConnectionState::GaveUp);
    }

    #[tokio::test]
    async fn test_enqueue_requires_connection() {
        let url = Url::parse("ws://127.0.0.1:9/api/v1/ws").unwrap();
        let (client, _events) = ChatClient::connect(ChatClientConfig::new(url), "token");
        assert!(matches!(
            client.typing(Uuid::now_v7(), true),
            Err(ClientError::Transport(_))
        ));
        client.logout().await;
    }
}
