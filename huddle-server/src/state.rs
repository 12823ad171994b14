//! Application state shared across all request handlers.

use std::sync::Arc;

use huddle_core::chat::{ConnectionHub, CredentialVerifier, VerifiedCredential};
use huddle_core::coordinator::Coordinator;
use huddle_core::entities::UserId;
use huddle_core::store::MemoryRepository;
use huddle_sdk::signature::{SessionToken, SignatureError, expires_at, verify_session_token};
use time::OffsetDateTime;
use tokio::sync::{RwLock, watch};

use crate::config::runtime::{AuthConfig, SharedConfig};

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
    /// Opens realtime connections for the WebSocket endpoint.
    pub hub: ConnectionHub,
    /// Runtime configuration (the auth section can be reloaded via SIGHUP).
    pub config: SharedConfig,
    /// Bumped after every auth reload so live sockets re-check their tokens.
    auth_generation: Arc<watch::Sender<u64>>,
}

impl AppState {
    /// Build the engine over an in-process repository.
    pub fn new(config: SharedConfig) -> Self {
        let coordinator = Coordinator::new(
            Arc::new(MemoryRepository::new()),
            config.chat.engine_config(),
        );
        let verifier = Arc::new(SessionVerifier {
            auth: config.auth.clone(),
        });
        let hub = coordinator.connection_hub(verifier);
        Self {
            coordinator,
            hub,
            config,
            auth_generation: Arc::new(watch::Sender::new(0)),
        }
    }

    /// Tell live connections that the auth section changed.
    pub fn notify_auth_reloaded(&self) {
        self.auth_generation.send_modify(|generation| *generation += 1);
    }

    pub fn auth_reloads(&self) -> watch::Receiver<u64> {
        self.auth_generation.subscribe()
    }

    /// Verify a session token against the current auth section.
    pub async fn authenticate(&self, token: &str) -> Result<UserId, SignatureError> {
        verify_with(&*self.config.auth.read().await, token)
    }
}

fn verify_with(auth: &AuthConfig, token: &str) -> Result<UserId, SignatureError> {
    verify_session_token(token, auth.secret_bytes(), auth.token_ttl_secs).map(UserId::from)
}

/// Accepts session tokens signed with the configured secret.
struct SessionVerifier {
    auth: Arc<RwLock<AuthConfig>>,
}

#[async_trait::async_trait]
impl CredentialVerifier for SessionVerifier {
    async fn verify(&self, credential: &str) -> Option<VerifiedCredential> {
        let auth = self.auth.read().await;
        let token = SessionToken::parse(credential).ok()?;
        let lapses_at = expires_at(token.timestamp, auth.token_ttl_secs);
        let user_id = token
            .verify(auth.secret_bytes(), auth.token_ttl_secs)
            .ok()?;
        let lapses_at = OffsetDateTime::from_unix_timestamp(lapses_at).ok()?;
        Some(VerifiedCredential::new(UserId::from(user_id)).expiring_at(lapses_at))
    }
}
