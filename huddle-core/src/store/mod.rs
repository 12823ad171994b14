//! Persistence collaborator contract.
//!
//! The engine keeps no process-wide state of its own: every record lives behind a
//! [`Repository`]. Reads return [`Versioned`] records and writes are grouped into a
//! [`Transaction`] whose expectations are checked together, so a commit is applied
//! completely or not at all.

pub mod event_store;
pub mod locks;
pub mod memory;

use std::collections::HashMap;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::entities::UserId;
use crate::entities::event::Event;
use crate::entities::join_request::JoinRequest;
use crate::entities::message::Message;
use crate::entities::usage::UserUsage;

pub use event_store::{EventStore, EventStoreError, NearbyEvent, RadiusFilter};
pub use locks::{EntityLocks, LockKey, LockTimeout};
pub use memory::MemoryRepository;

#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub record: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    /// Expectation matching this exact version.
    pub fn expect(&self) -> Expect {
        Expect::Version(self.version)
    }
}

/// Precondition attached to each write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// The record must not exist yet.
    Absent,
    /// The stored record must still carry this version.
    Version(u64),
}

#[derive(Debug, Clone)]
pub enum Write {
    Event { record: Event, expect: Expect },
    JoinRequest { record: JoinRequest, expect: Expect },
    /// Messages are insert-only and their `seq` must be the event's head plus one.
    Message { record: Message },
    Usage { record: UserUsage, expect: Expect },
    /// Moves a user's read watermark forward; never moves it back.
    ReadCursor {
        event_id: Uuid,
        user_id: UserId,
        seq: u64,
    },
}

/// A batch of writes applied all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    writes: Vec<Write>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_event(mut self, record: Event, expect: Expect) -> Self {
        self.writes.push(Write::Event { record, expect });
        self
    }

    pub fn put_join_request(mut self, record: JoinRequest, expect: Expect) -> Self {
        self.writes.push(Write::JoinRequest { record, expect });
        self
    }

    pub fn append_message(mut self, record: Message) -> Self {
        self.writes.push(Write::Message { record });
        self
    }

    pub fn put_usage(mut self, record: UserUsage, expect: Expect) -> Self {
        self.writes.push(Write::Usage { record, expect });
        self
    }

    pub fn advance_read_cursor(mut self, event_id: Uuid, user_id: UserId, seq: u64) -> Self {
        self.writes.push(Write::ReadCursor {
            event_id,
            user_id,
            seq,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

/// Sequence-range query over one event's message log.
///
/// `after` and `before` are exclusive bounds. When `from_newest` is set the page is
/// taken from the newest end of the range; results are always oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageQuery {
    pub event_id: Uuid,
    pub after: Option<u64>,
    pub before: Option<u64>,
    pub limit: usize,
    pub from_newest: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("{entity} {id} was modified concurrently")]
    VersionMismatch { entity: &'static str, id: String },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    async fn event(&self, id: Uuid) -> Result<Option<Versioned<Event>>, RepositoryError>;

    async fn events(&self) -> Result<Vec<Event>, RepositoryError>;

    /// Ids of the events the user created or was accepted into.
    async fn events_joined_by(&self, user_id: &str) -> Result<Vec<Uuid>, RepositoryError>;

    async fn join_request(
        &self,
        id: Uuid,
    ) -> Result<Option<Versioned<JoinRequest>>, RepositoryError>;

    /// Every request of an event, oldest first.
    async fn join_requests_for_event(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<JoinRequest>, RepositoryError>;

    async fn messages(&self, query: MessageQuery) -> Result<Vec<Message>, RepositoryError>;

    /// Highest assigned sequence number of an event, `0` when it has no messages.
    async fn message_head(&self, event_id: Uuid) -> Result<u64, RepositoryError>;

    async fn read_cursors(&self, event_id: Uuid) -> Result<HashMap<UserId, u64>, RepositoryError>;

    async fn usage(&self, user_id: &str) -> Result<Option<Versioned<UserUsage>>, RepositoryError>;

    async fn commit(&self, tx: Transaction) -> Result<(), RepositoryError>;
}

/// Reads a user's usage record, creating a free-tier record on first sight.
/// Returns the record together with the expectation its write must carry.
pub async fn load_usage(
    repo: &dyn Repository,
    user_id: &str,
    now: OffsetDateTime,
) -> Result<(UserUsage, Expect), RepositoryError> {
    Ok(match repo.usage(user_id).await? {
        Some(stored) => {
            let expect = stored.expect();
            (stored.record, expect)
        }
        None => (UserUsage::first_seen(user_id.into(), now), Expect::Absent),
    })
}
