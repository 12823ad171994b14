use std::sync::Arc;

use huddle_sdk::objects::HistoryCursor;
use itertools::Itertools;
use time::OffsetDateTime;
use uuid::Uuid;

use super::connection::ConnectionId;
use super::typing::TypingTracker;
use crate::entities::UserId;
use crate::entities::event::Event;
use crate::entities::message::{Message, ReceiptedMessage};
use crate::events::{Broker, Envelope, RealtimeEvent};
use crate::store::{
    EntityLocks, EventStore, EventStoreError, LockKey, LockTimeout, MessageQuery, Repository,
    RepositoryError, Transaction,
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChatError {
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),
    #[error("event {0} not found")]
    EventNotFound(Uuid),
    #[error("not a participant of this event")]
    Forbidden,
    #[error(transparent)]
    Busy(#[from] LockTimeout),
    #[error("{0}")]
    Conflict(&'static str),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for ChatError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::VersionMismatch { .. } => {
                ChatError::Conflict("message log moved concurrently, retry")
            }
            other => ChatError::Repository(other),
        }
    }
}

impl From<EventStoreError> for ChatError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::NotFound(id) => ChatError::EventNotFound(id),
            EventStoreError::Repository(err) => err.into(),
            EventStoreError::InvalidSpec(reason) => ChatError::Conflict(reason),
            EventStoreError::Roster(_) => ChatError::Conflict("roster changed concurrently"),
        }
    }
}

/// One page of history, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPage {
    pub messages: Vec<ReceiptedMessage>,
    /// Continue towards newer messages.
    pub newer: Option<HistoryCursor>,
    /// Continue towards older messages.
    pub older: Option<HistoryCursor>,
}

/// Per-event message log plus typing and read tracking.
///
/// Membership is re-read from the Event Store on every call.
#[derive(Clone)]
pub struct ChatChannel {
    repo: Arc<dyn Repository>,
    events: EventStore,
    locks: Arc<EntityLocks>,
    broker: Broker,
    typing: TypingTracker,
    page_max: u32,
}

impl ChatChannel {
    pub fn new(
        repo: Arc<dyn Repository>,
        locks: Arc<EntityLocks>,
        broker: Broker,
        typing: TypingTracker,
        page_max: u32,
    ) -> Self {
        Self {
            events: EventStore::new(repo.clone()),
            repo,
            locks,
            broker,
            typing,
            page_max: page_max.max(1),
        }
    }

    async fn member_event(&self, event_id: Uuid, user_id: &str) -> Result<Event, ChatError> {
        let event = self.events.get_event(event_id).await?.record;
        if !event.is_member(user_id) {
            return Err(ChatError::Forbidden);
        }
        Ok(event)
    }

    /// Appends a message with the next sequence number and broadcasts it.
    pub async fn post_message(
        &self,
        event_id: Uuid,
        sender_id: &str,
        text: &str,
        now: OffsetDateTime,
    ) -> Result<Message, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::InvalidMessage("text is empty"));
        }
        // The sequence number is assigned under the same lock as the append.
        let _guard = self.locks.acquire(LockKey::Event(event_id)).await?;
        let event = self.member_event(event_id, sender_id).await?;
        let sender_name = event.member_name(sender_id).unwrap_or(sender_id).into();
        let head = self.repo.message_head(event_id).await?;
        let message = Message {
            id: Uuid::now_v7(),
            event_id,
            seq: head + 1,
            sender_id: sender_id.into(),
            sender_name,
            text: text.to_owned(),
            created_at: now,
        };
        self.repo
            .commit(Transaction::new().append_message(message.clone()))
            .await?;
        self.broker.publish(Envelope::to_event(
            event_id,
            RealtimeEvent::MessageCreated(message.clone()),
        ));
        tracing::debug!(%event_id, seq = message.seq, sender = %message.sender_id, "Message posted");
        Ok(message)
    }

    /// A page of messages in sequence order. With a viewer, only members may read.
    pub async fn history(
        &self,
        event_id: Uuid,
        viewer: Option<&str>,
        cursor: HistoryCursor,
        page_size: u32,
    ) -> Result<HistoryPage, ChatError> {
        match viewer {
            Some(viewer) => {
                self.member_event(event_id, viewer).await?;
            }
            None => {
                self.events.get_event(event_id).await?;
            }
        }
        let limit = usize::try_from(page_size.clamp(1, self.page_max)).unwrap_or(usize::MAX);
        let (after, before, from_newest) = match cursor {
            HistoryCursor::Start => (None, None, false),
            HistoryCursor::After(seq) => (Some(seq), None, false),
            HistoryCursor::Before(seq) => (None, Some(seq), true),
            HistoryCursor::Latest => (None, None, true),
        };
        let messages = self
            .repo
            .messages(MessageQuery {
                event_id,
                after,
                before,
                limit,
                from_newest,
            })
            .await?;
        let head = self.repo.message_head(event_id).await?;
        let cursors = self.repo.read_cursors(event_id).await?;

        let newer = messages
            .last()
            .filter(|last| last.seq < head)
            .map(|last| HistoryCursor::After(last.seq));
        let older = messages
            .first()
            .filter(|first| first.seq > 1)
            .map(|first| HistoryCursor::Before(first.seq));
        let messages = messages
            .into_iter()
            .map(|message| {
                let read_by = cursors
                    .iter()
                    .filter(|(_, read_up_to)| **read_up_to >= message.seq)
                    .map(|(user_id, _)| user_id.clone())
                    .sorted()
                    .collect();
                ReceiptedMessage { message, read_by }
            })
            .collect();
        Ok(HistoryPage {
            messages,
            newer,
            older,
        })
    }

    /// Typing-start or typing-stop signal from a member, optionally sent over a
    /// live connection.
    pub async fn typing(
        &self,
        event_id: Uuid,
        user_id: &str,
        is_typing: bool,
        connection: Option<ConnectionId>,
    ) -> Result<(), ChatError> {
        let event = self.member_event(event_id, user_id).await?;
        if is_typing {
            let name = event.member_name(user_id).unwrap_or(user_id).into();
            match connection {
                Some(connection) => {
                    self.typing
                        .start_for(connection, event_id, user_id.into(), name)
                        .await;
                }
                None => {
                    self.typing.start(event_id, user_id.into(), name).await;
                }
            }
        } else {
            self.typing.stop(event_id, user_id).await;
        }
        Ok(())
    }

    /// Marks everything up to the current head as read by the user and tells the
    /// other members. Returns the sequence number read up to.
    pub async fn mark_read(&self, event_id: Uuid, user_id: &str) -> Result<u64, ChatError> {
        self.member_event(event_id, user_id).await?;
        let head = self.repo.message_head(event_id).await?;
        let previous = self
            .repo
            .read_cursors(event_id)
            .await?
            .get(user_id)
            .copied()
            .unwrap_or(0);
        if head <= previous {
            return Ok(previous);
        }
        let reader: UserId = user_id.into();
        self.repo
            .commit(Transaction::new().advance_read_cursor(event_id, reader.clone(), head))
            .await?;
        self.broker.publish(Envelope::to_event_except(
            event_id,
            reader.clone(),
            RealtimeEvent::ReadReceipt {
                event_id,
                user_id: reader,
                up_to_seq: head,
            },
        ));
        Ok(head)
    }

    pub fn typing_tracker(&self) -> &TypingTracker {
        &self.typing
    }
}
