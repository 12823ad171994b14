//! TOML file configuration structures.
//!
//! These structs directly map to the `huddle.toml` file format.

use huddle_sdk::signature::DEFAULT_TOKEN_TTL;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Session token verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC key shared with the account service that issues session tokens.
    pub secret: String,
    /// Maximum token age in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: i64,
}

fn default_token_ttl() -> i64 {
    DEFAULT_TOKEN_TTL
}

/// Chat engine tunables. Read at startup only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_typing_timeout_ms")]
    pub typing_timeout_ms: u64,
    #[serde(default = "default_history_page_max")]
    pub history_page_max: u32,
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            typing_timeout_ms: default_typing_timeout_ms(),
            history_page_max: default_history_page_max(),
            lock_wait_ms: default_lock_wait_ms(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

fn default_typing_timeout_ms() -> u64 {
    3000
}

fn default_history_page_max() -> u32 {
    100
}

fn default_lock_wait_ms() -> u64 {
    2000
}

fn default_broadcast_capacity() -> usize {
    1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[auth]
secret = "test-secret"
token_ttl_secs = 600

[chat]
typing_timeout_ms = 5000
history_page_max = 20
lock_wait_ms = 500
broadcast_capacity = 64
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.auth.secret, "test-secret");
        assert_eq!(config.auth.token_ttl_secs, 600);
        assert_eq!(config.chat.typing_timeout_ms, 5000);
        assert_eq!(config.chat.history_page_max, 20);
        assert_eq!(config.chat.lock_wait_ms, 500);
        assert_eq!(config.chat.broadcast_capacity, 64);
    }

    #[test]
    fn test_defaults() {
        let config: FileConfig = toml::from_str("[auth]\nsecret = \"s\"\n").unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.auth.token_ttl_secs, DEFAULT_TOKEN_TTL);
        assert_eq!(config.chat.typing_timeout_ms, 3000);
        assert_eq!(config.chat.history_page_max, 100);
        assert_eq!(config.chat.lock_wait_ms, 2000);
        assert_eq!(config.chat.broadcast_capacity, 1024);
    }

    #[test]
    fn test_auth_section_required() {
        assert!(toml::from_str::<FileConfig>("[server]\n").is_err());
    }
}
