//! Typing indicator state per (event, user).
//!
//! `idle -> typing` on a start signal. `typing -> idle` on an explicit stop or when
//! the inactivity timer expires; every start while already typing re-arms the
//! timer. The aggregated set of typing users is published whenever it changes.
//!
//! A slot remembers the live connection that last signalled it. Closing a
//! connection only cancels the slots it owns, so another device of the same
//! user keeps its indicator.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use compact_str::CompactString;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::connection::ConnectionId;
use crate::entities::UserId;
use crate::events::{Broker, Envelope, RealtimeEvent, TypingUser};

/// Inactivity timeout after the last typing-start signal.
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_secs(3);

struct TypingSlot {
    name: CompactString,
    generation: u64,
    /// `None` for signals that did not come through a live connection.
    owner: Option<ConnectionId>,
    timer: JoinHandle<()>,
}

type TypingSets = HashMap<Uuid, BTreeMap<UserId, TypingSlot>>;

struct TypingInner {
    sets: Mutex<TypingSets>,
    broker: Broker,
    timeout: Duration,
    generation: AtomicU64,
}

impl TypingInner {
    fn publish(&self, event_id: Uuid, users: Option<&BTreeMap<UserId, TypingSlot>>) {
        let typing = users
            .map(|users| {
                users
                    .iter()
                    .map(|(user_id, slot)| TypingUser {
                        user_id: user_id.clone(),
                        name: slot.name.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        self.broker.publish(Envelope::to_event(
            event_id,
            RealtimeEvent::TypingChanged { event_id, typing },
        ));
    }

    /// Removes a user from an event's set and publishes the new set.
    /// Returns `false` if the user was not typing.
    fn remove(&self, sets: &mut TypingSets, event_id: Uuid, user_id: &str) -> bool {
        let Some(users) = sets.get_mut(&event_id) else {
            return false;
        };
        let Some(slot) = users.remove(user_id) else {
            return false;
        };
        slot.timer.abort();
        if users.is_empty() {
            sets.remove(&event_id);
        }
        self.publish(event_id, sets.get(&event_id));
        true
    }

    async fn expire(&self, event_id: Uuid, user_id: &str, generation: u64) {
        let mut sets = self.sets.lock().await;
        let current = sets
            .get(&event_id)
            .and_then(|users| users.get(user_id))
            .map(|slot| slot.generation);
        // A newer start or a stop got here first.
        if current != Some(generation) {
            return;
        }
        if self.remove(&mut sets, event_id, user_id) {
            tracing::debug!(%event_id, %user_id, "Typing indicator expired");
        }
    }
}

#[derive(Clone)]
pub struct TypingTracker {
    inner: Arc<TypingInner>,
}

impl TypingTracker {
    pub fn new(broker: Broker, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(TypingInner {
                sets: Mutex::new(HashMap::new()),
                broker,
                timeout,
                generation: AtomicU64::new(0),
            }),
        }
    }

    fn arm_timer(&self, event_id: Uuid, user_id: UserId, generation: u64) -> JoinHandle<()> {
        let inner: Weak<TypingInner> = Arc::downgrade(&self.inner);
        let timeout = self.inner.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = inner.upgrade() {
                inner.expire(event_id, &user_id, generation).await;
            }
        })
    }

    /// Typing-start signal. Returns `true` if the user was idle before.
    pub async fn start(&self, event_id: Uuid, user_id: UserId, name: CompactString) -> bool {
        self.begin(None, event_id, user_id, name).await
    }

    /// Typing-start signal sent over a live connection, which then owns the slot.
    pub async fn start_for(
        &self,
        connection: ConnectionId,
        event_id: Uuid,
        user_id: UserId,
        name: CompactString,
    ) -> bool {
        self.begin(Some(connection), event_id, user_id, name).await
    }

    async fn begin(
        &self,
        owner: Option<ConnectionId>,
        event_id: Uuid,
        user_id: UserId,
        name: CompactString,
    ) -> bool {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let mut sets = self.inner.sets.lock().await;
        let timer = self.arm_timer(event_id, user_id.clone(), generation);
        let users = sets.entry(event_id).or_default();
        let slot = TypingSlot {
            name,
            generation,
            owner,
            timer,
        };
        match users.insert(user_id, slot) {
            Some(previous) => {
                previous.timer.abort();
                false
            }
            None => {
                self.inner.publish(event_id, Some(&*users));
                true
            }
        }
    }

    /// Explicit stop signal. Returns `true` if the user was typing.
    pub async fn stop(&self, event_id: Uuid, user_id: &str) -> bool {
        let mut sets = self.inner.sets.lock().await;
        self.inner.remove(&mut sets, event_id, user_id)
    }

    /// Cancels the slots a closing connection owns in the given events.
    pub async fn clear_connection(
        &self,
        connection: ConnectionId,
        event_ids: impl IntoIterator<Item = Uuid>,
    ) {
        let mut sets = self.inner.sets.lock().await;
        for event_id in event_ids {
            let owned: Vec<UserId> = sets
                .get(&event_id)
                .map(|users| {
                    users
                        .iter()
                        .filter(|(_, slot)| slot.owner == Some(connection))
                        .map(|(user_id, _)| user_id.clone())
                        .collect()
                })
                .unwrap_or_default();
            for user_id in owned {
                self.inner.remove(&mut sets, event_id, &user_id);
            }
        }
    }

    pub async fn typing_users(&self, event_id: Uuid) -> Vec<TypingUser> {
        let sets = self.inner.sets.lock().await;
        sets.get(&event_id)
            .map(|users| {
                users
                    .iter()
                    .map(|(user_id, slot)| TypingUser {
                        user_id: user_id.clone(),
                        name: slot.name.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
