//! Runtime configuration, split into sections that can be swapped independently.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use huddle_core::coordinator::EngineConfig;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

/// Session token verification settings. Reloaded on SIGHUP.
#[derive(Clone)]
pub struct AuthConfig {
    secret: Box<[u8]>,
    pub token_ttl_secs: i64,
}

impl AuthConfig {
    pub fn new(secret: Box<[u8]>, token_ttl_secs: i64) -> Self {
        Self {
            secret,
            token_ttl_secs,
        }
    }

    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatConfig {
    pub typing_timeout: Duration,
    pub history_page_max: u32,
    pub lock_wait: Duration,
    pub broadcast_capacity: usize,
}

impl ChatConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            typing_timeout: self.typing_timeout,
            lock_wait: self.lock_wait,
            history_page_max: self.history_page_max,
            broadcast_capacity: self.broadcast_capacity,
        }
    }
}

/// Configuration shared across handlers. Each section has its own lock.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    pub server: Arc<RwLock<ServerConfig>>,
    pub auth: Arc<RwLock<AuthConfig>>,
    /// Fixed for the lifetime of the engine.
    pub chat: ChatConfig,
}
