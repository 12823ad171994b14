//! Configuration module for huddle-server.
//!
//! Handles loading configuration from TOML files and CLI arguments.

pub mod file;
pub mod runtime;

use crate::config::file::FileConfig;
use crate::config::runtime::{AuthConfig, ChatConfig, ServerConfig, SharedConfig};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Loaded configuration result containing all parts.
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub chat: ChatConfig,
}

impl LoadedConfig {
    /// Convert into a SharedConfig with Arc<RwLock<T>> wrappers.
    pub fn into_shared(self) -> SharedConfig {
        SharedConfig {
            server: Arc::new(RwLock::new(self.server)),
            auth: Arc::new(RwLock::new(self.auth)),
            chat: self.chat,
        }
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read the TOML file, apply CLI overrides and validate.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        Self::parse(&config_content, self.listen_override)
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn parse(
        content: &str,
        listen_override: Option<SocketAddr>,
    ) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(content)?;
        if let Some(listen) = listen_override {
            file_config.server.listen = listen;
        }
        validate(&file_config)?;
        Ok(build_loaded_config(file_config))
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.auth.secret.is_empty() {
        return Err(ConfigError::ValidationError(
            "auth.secret must not be empty".to_owned(),
        ));
    }
    if config.auth.token_ttl_secs <= 0 {
        return Err(ConfigError::ValidationError(
            "auth.token_ttl_secs must be positive".to_owned(),
        ));
    }
    let chat = &config.chat;
    for (name, value) in [
        ("chat.typing_timeout_ms", chat.typing_timeout_ms),
        ("chat.lock_wait_ms", chat.lock_wait_ms),
        ("chat.history_page_max", u64::from(chat.history_page_max)),
        ("chat.broadcast_capacity", chat.broadcast_capacity as u64),
    ] {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{name} must be greater than zero"
            )));
        }
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    let chat = file_config.chat;
    LoadedConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
        },
        auth: AuthConfig::new(
            file_config.auth.secret.into_bytes().into_boxed_slice(),
            file_config.auth.token_ttl_secs,
        ),
        chat: ChatConfig {
            typing_timeout: Duration::from_millis(chat.typing_timeout_ms),
            history_page_max: chat.history_page_max,
            lock_wait: Duration::from_millis(chat.lock_wait_ms),
            broadcast_capacity: chat.broadcast_capacity,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_override_wins() {
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let loaded = ConfigLoader::parse(
            "[server]\nlisten = \"0.0.0.0:80\"\n[auth]\nsecret = \"s\"\n",
            Some(addr),
        )
        .unwrap();
        assert_eq!(loaded.server.listen, addr);
        assert_eq!(loaded.auth.secret_bytes(), b"s");
        assert_eq!(loaded.chat.typing_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(
            ConfigLoader::parse("[auth]\nsecret = \"\"\n", None),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_zero_tunables_rejected() {
        for section in [
            "typing_timeout_ms = 0",
            "history_page_max = 0",
            "lock_wait_ms = 0",
            "broadcast_capacity = 0",
        ] {
            let content = format!("[auth]\nsecret = \"s\"\n[chat]\n{section}\n");
            assert!(
                matches!(
                    ConfigLoader::parse(&content, None),
                    Err(ConfigError::ValidationError(_))
                ),
                "{section} accepted"
            );
        }
    }

    #[test]
    fn test_load_from_disk() {
        let path = std::env::temp_dir().join(format!("huddle-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[auth]\nsecret = \"disk\"\n").unwrap();
        let loaded = ConfigLoader::new(&path, None).load().unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.auth.secret_bytes(), b"disk");
        assert!(matches!(
            ConfigLoader::new(&path, None).load(),
            Err(ConfigError::IoError(_))
        ));
    }
}
