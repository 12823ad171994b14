//! Coordinator: the operations the API surface calls.
//!
//! Each operation is a command type with a `Processor` impl on [`Coordinator`].
//! An operation either commits its whole state change and then publishes its
//! realtime events, or fails without touching anything. Errors are translated to
//! [`CoordinatorError`] and logged here for the last time.

mod commands;

use std::sync::Arc;
use std::time::Duration;

use crate::chat::{
    ChatChannel, ChatError, ConnectionHub, CredentialVerifier, DEFAULT_TYPING_TIMEOUT,
    TypingTracker,
};
use crate::entities::TierName;
use crate::events::{Broker, DEFAULT_BROADCAST_CAPACITY};
use crate::join::{JoinError, JoinRequestEngine};
use crate::store::{
    EntityLocks, EventStore, EventStoreError, LockTimeout, Repository, RepositoryError,
};

pub use commands::*;

/// Engine tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub typing_timeout: Duration,
    /// Upper bound on waiting for an entity lock before failing with `Conflict`.
    pub lock_wait: Duration,
    pub history_page_max: u32,
    pub broadcast_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
            lock_wait: Duration::from_secs(2),
            history_page_max: 100,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoordinatorError {
    /// Malformed activity input. The user must correct it.
    #[error("invalid activity: {0}")]
    InvalidSpec(String),
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("the {tier} tier allows {limit} activities and {current} were already created")]
    QuotaExceeded {
        tier: TierName,
        limit: i32,
        current: u32,
    },
    #[error("the {tier} tier allows a radius of {max_radius_km} km, {requested_km} km requested")]
    RadiusNotAllowed {
        tier: TierName,
        max_radius_km: i32,
        requested_km: f64,
    },
    /// Capacity or duplicate-state race. Safe to retry after re-reading.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid state transition: {0}")]
    InvalidState(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// The persistence collaborator failed.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl CoordinatorError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Conflict(_) | CoordinatorError::Unavailable(_)
        )
    }

    /// The tier that caused a policy rejection, if any.
    pub fn limiting_tier(&self) -> Option<TierName> {
        match self {
            CoordinatorError::QuotaExceeded { tier, .. }
            | CoordinatorError::RadiusNotAllowed { tier, .. } => Some(*tier),
            _ => None,
        }
    }
}

impl From<RepositoryError> for CoordinatorError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::VersionMismatch { .. } => {
                CoordinatorError::Conflict(format!("{value}, retry"))
            }
            RepositoryError::Unavailable(reason) => CoordinatorError::Unavailable(reason),
        }
    }
}

impl From<LockTimeout> for CoordinatorError {
    fn from(value: LockTimeout) -> Self {
        CoordinatorError::Conflict(value.to_string())
    }
}

impl From<EventStoreError> for CoordinatorError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::InvalidSpec(reason) => CoordinatorError::InvalidSpec(reason.to_owned()),
            EventStoreError::NotFound(id) => CoordinatorError::NotFound {
                entity: "event",
                id: id.to_string(),
            },
            EventStoreError::Roster(err) => CoordinatorError::Conflict(err.to_string()),
            EventStoreError::Repository(err) => err.into(),
        }
    }
}

impl From<JoinError> for CoordinatorError {
    fn from(value: JoinError) -> Self {
        match value {
            JoinError::EventNotFound(id) => CoordinatorError::NotFound {
                entity: "event",
                id: id.to_string(),
            },
            JoinError::RequestNotFound(id) => CoordinatorError::NotFound {
                entity: "join request",
                id: id.to_string(),
            },
            JoinError::Conflict(reason) => CoordinatorError::Conflict(reason.to_owned()),
            err @ JoinError::InvalidState { .. } => CoordinatorError::InvalidState(err.to_string()),
            err @ JoinError::Forbidden => CoordinatorError::Forbidden(err.to_string()),
            JoinError::Busy(err) => err.into(),
            JoinError::Repository(err) => err.into(),
        }
    }
}

impl From<ChatError> for CoordinatorError {
    fn from(value: ChatError) -> Self {
        match value {
            ChatError::InvalidMessage(reason) => CoordinatorError::InvalidMessage(reason.to_owned()),
            ChatError::EventNotFound(id) => CoordinatorError::NotFound {
                entity: "event",
                id: id.to_string(),
            },
            err @ ChatError::Forbidden => CoordinatorError::Forbidden(err.to_string()),
            ChatError::Busy(err) => err.into(),
            ChatError::Conflict(reason) => CoordinatorError::Conflict(reason.to_owned()),
            ChatError::Repository(err) => err.into(),
        }
    }
}

fn log_failure(operation: &'static str, err: &CoordinatorError) {
    match err {
        CoordinatorError::Unavailable(_) => {
            tracing::error!(operation, error = %err, "Operation failed");
        }
        CoordinatorError::Conflict(_) => {
            tracing::warn!(operation, error = %err, "Operation conflicted");
        }
        _ => {
            tracing::debug!(operation, error = %err, "Operation rejected");
        }
    }
}

#[derive(Clone)]
pub struct Coordinator {
    repo: Arc<dyn Repository>,
    locks: Arc<EntityLocks>,
    events: EventStore,
    joins: JoinRequestEngine,
    chat: ChatChannel,
    broker: Broker,
    typing: TypingTracker,
}

impl Coordinator {
    /// Builds an engine instance over a repository. Instances share nothing
    /// except what the repository holds.
    pub fn new(repo: Arc<dyn Repository>, config: EngineConfig) -> Self {
        let locks = Arc::new(EntityLocks::new(config.lock_wait));
        let broker = Broker::new(config.broadcast_capacity);
        let typing = TypingTracker::new(broker.clone(), config.typing_timeout);
        Self {
            events: EventStore::new(repo.clone()),
            joins: JoinRequestEngine::new(repo.clone(), locks.clone()),
            chat: ChatChannel::new(
                repo.clone(),
                locks.clone(),
                broker.clone(),
                typing.clone(),
                config.history_page_max,
            ),
            repo,
            locks,
            broker,
            typing,
        }
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// A hub opening live connections against this engine's broker.
    pub fn connection_hub(&self, verifier: Arc<dyn CredentialVerifier>) -> ConnectionHub {
        ConnectionHub::new(
            self.repo.clone(),
            self.broker.clone(),
            self.typing.clone(),
            verifier,
        )
    }
}
