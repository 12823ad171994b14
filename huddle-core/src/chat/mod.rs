//! Chat Channel: per-event message log, typing indicators, read receipts and
//! live connections.

pub mod channel;
pub mod connection;
pub mod typing;

pub use channel::{ChatChannel, ChatError, HistoryPage};
pub use connection::{
    ChatConnection, ConnectError, ConnectionHub, ConnectionId, CredentialVerifier,
    VerifiedCredential,
};
pub use typing::{DEFAULT_TYPING_TIMEOUT, TypingTracker};
